use log::{error, info, warn};
use tokio::task::spawn_blocking;

use requestify_engine::{EngineEvent, PlaylistSink, PrimaryKey, PropositionData};

use crate::ServerContext;

/// Drains the engine event channel for the lifetime of the process.
///
/// Promotions are forwarded to the configured playlist from here, off the
/// request path. Every other event is consumed and discarded so the channel
/// never accumulates.
pub async fn check_events(context: ServerContext) {
    let events = context.engine.events();

    while let Ok(event) = {
        let receiver = events.clone();
        spawn_blocking(move || receiver.recv())
            .await
            .expect("event receive task joins")
    } {
        if let EngineEvent::PropositionPromoted {
            session_id,
            proposition,
            ..
        } = event
        {
            forward_promotion(&context, session_id, proposition).await;
        }
    }
}

async fn forward_promotion(
    context: &ServerContext,
    session_id: PrimaryKey,
    proposition: PropositionData,
) {
    let Some(playlist) = &context.playlist else {
        return;
    };

    let session = match context.engine.sessions.session_by_id(session_id).await {
        Ok(session) => session,
        Err(e) => {
            warn!(
                "Session {} of promoted proposition {} could not be loaded: {}",
                session_id, proposition.id, e
            );
            return;
        }
    };

    let Some(playlist_ref) = &session.playlist_ref else {
        return;
    };

    match playlist
        .add_track(playlist_ref, &proposition.track_ref)
        .await
    {
        Ok(()) => info!(
            "Forwarded {} to playlist {}",
            proposition.track_name, playlist_ref
        ),
        Err(e) => error!(
            "Failed to forward {} to playlist {}: {}",
            proposition.track_name, playlist_ref, e
        ),
    }
}
