use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json,
};
use serde::Serialize;

use requestify_engine::{NewSession, NewStreamer, QueueMode};

use crate::{
    errors::ServerResult,
    schemas::{
        ActiveSchema, Identity, NewSessionSchema, QueueModeSchema, RegisterStreamerSchema,
        StreamerTokenSchema, ValidatedJson,
    },
    serialized::{HistoryEntry, Session, Streamer, ToSerialized},
    Router, ServerContext,
};

#[derive(Debug, Serialize)]
struct ShuffleResult {
    count: usize,
}

async fn register_streamer(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<RegisterStreamerSchema>,
) -> ServerResult<Json<Streamer>> {
    let streamer = context
        .engine
        .sessions
        .register_streamer(NewStreamer {
            external_id: body.external_id,
            display_name: body.display_name,
        })
        .await?;

    Ok(Json(streamer.to_serialized()))
}

async fn set_streamer_token(
    Identity(identity): Identity,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<StreamerTokenSchema>,
) -> ServerResult<Json<Streamer>> {
    let streamer = context
        .engine
        .sessions
        .streamer_by_external_id(&identity)
        .await?;

    context
        .engine
        .sessions
        .set_streamer_token(streamer.id, body.access_token.as_deref())
        .await?;

    let streamer = context
        .engine
        .sessions
        .streamer_by_external_id(&identity)
        .await?;

    Ok(Json(streamer.to_serialized()))
}

async fn streamer_history(
    Identity(identity): Identity,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<HistoryEntry>>> {
    let streamer = context
        .engine
        .sessions
        .streamer_by_external_id(&identity)
        .await?;

    let history = context.engine.sessions.history(streamer.id).await?;

    Ok(Json(history.to_serialized()))
}

async fn create_session(
    Identity(identity): Identity,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewSessionSchema>,
) -> ServerResult<Json<Session>> {
    // Sessions can only be claimed for oneself
    let streamer = context
        .engine
        .sessions
        .streamer_by_external_id(&identity)
        .await?;

    let session = context
        .engine
        .sessions
        .create(NewSession {
            code: body.code,
            streamer_id: streamer.id,
            prevent_duplicates: body.prevent_duplicates,
            queue_mode: body.queue_mode.unwrap_or(QueueMode::Chronological),
            is_private: body.is_private,
            playlist_ref: body.playlist_ref,
        })
        .await?;

    Ok(Json(session.to_serialized()))
}

async fn session(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Json<Session>> {
    let session = context.engine.sessions.session_by_code(&code).await?;

    Ok(Json(session.to_serialized()))
}

async fn set_queue_mode(
    Identity(identity): Identity,
    State(context): State<ServerContext>,
    Path(code): Path<String>,
    ValidatedJson(body): ValidatedJson<QueueModeSchema>,
) -> ServerResult<Json<Session>> {
    let session = context.engine.sessions.session_by_code(&code).await?;

    context
        .engine
        .sessions
        .set_queue_mode(session.id, &identity, body.mode)
        .await?;

    let session = context.engine.sessions.session_by_id(session.id).await?;

    Ok(Json(session.to_serialized()))
}

async fn shuffle(
    Identity(identity): Identity,
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Json<ShuffleResult>> {
    let session = context.engine.sessions.session_by_code(&code).await?;

    let count = context
        .engine
        .sessions
        .shuffle(session.id, &identity)
        .await?;

    Ok(Json(ShuffleResult { count }))
}

async fn set_active(
    Identity(identity): Identity,
    State(context): State<ServerContext>,
    Path(code): Path<String>,
    ValidatedJson(body): ValidatedJson<ActiveSchema>,
) -> ServerResult<Json<Session>> {
    let session = context.engine.sessions.session_by_code(&code).await?;

    context
        .engine
        .sessions
        .set_active(session.id, &identity, body.active)
        .await?;

    let session = context.engine.sessions.session_by_id(session.id).await?;

    Ok(Json(session.to_serialized()))
}

async fn delete_session(
    Identity(identity): Identity,
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<()> {
    let session = context.engine.sessions.session_by_code(&code).await?;

    context
        .engine
        .sessions
        .delete(session.id, &identity)
        .await?;

    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/streamers", post(register_streamer))
        .route("/streamers/token", put(set_streamer_token))
        .route("/streamers/history", get(streamer_history))
        .route("/sessions", post(create_session))
        .route("/sessions/:code", get(session).delete(delete_session))
        .route("/sessions/:code/queue-mode", put(set_queue_mode))
        .route("/sessions/:code/shuffle", post(shuffle))
        .route("/sessions/:code/active", put(set_active))
}
