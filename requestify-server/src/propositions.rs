use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json,
};
use requestify_engine::{ModerationAction, NewSubmission, PrimaryKey, TrackMetadata};

use crate::{
    errors::ServerResult,
    schemas::{
        Identity, ModerateSchema, ModerationActionSchema, NewPropositionSchema, ValidatedJson,
    },
    serialized::{Proposition, ToSerialized},
    Router, ServerContext,
};

async fn submit(
    Identity(identity): Identity,
    State(context): State<ServerContext>,
    Path(code): Path<String>,
    ValidatedJson(body): ValidatedJson<NewPropositionSchema>,
) -> ServerResult<Json<Proposition>> {
    let session = context.engine.sessions.session_by_code(&code).await?;

    let proposition = context
        .engine
        .propositions
        .submit(NewSubmission {
            session_id: session.id,
            viewer_id: identity,
            track_ref: body.track_ref,
            metadata: TrackMetadata {
                name: body.name,
                artist: body.artist,
                album: body.album,
                duration: body.duration,
            },
            message: body.message,
        })
        .await?;

    Ok(Json(proposition.to_serialized()))
}

async fn list(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Json<Vec<Proposition>>> {
    let session = context.engine.sessions.session_by_code(&code).await?;
    let propositions = context.engine.propositions.list(session.id).await?;

    Ok(Json(propositions.to_serialized()))
}

async fn queue(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Json<Vec<Proposition>>> {
    let session = context.engine.sessions.session_by_code(&code).await?;
    let queue = context.engine.propositions.queue(session.id).await?;

    Ok(Json(queue.to_serialized()))
}

async fn moderate(
    Identity(identity): Identity,
    State(context): State<ServerContext>,
    Path((code, proposition_id)): Path<(String, PrimaryKey)>,
    ValidatedJson(body): ValidatedJson<ModerateSchema>,
) -> ServerResult<Json<Proposition>> {
    let session = context.engine.sessions.session_by_code(&code).await?;

    context
        .engine
        .propositions
        .proposition_in_session(session.id, proposition_id)
        .await?;

    let action = match body.action {
        ModerationActionSchema::Approve => ModerationAction::Approve,
        ModerationActionSchema::Reject => ModerationAction::Reject,
        ModerationActionSchema::Requeue => ModerationAction::Requeue,
    };

    let proposition = context
        .engine
        .propositions
        .moderate(proposition_id, &identity, action)
        .await?;

    Ok(Json(proposition.to_serialized()))
}

async fn promote(
    Identity(identity): Identity,
    State(context): State<ServerContext>,
    Path((code, proposition_id)): Path<(String, PrimaryKey)>,
) -> ServerResult<Json<Proposition>> {
    let session = context.engine.sessions.session_by_code(&code).await?;

    context
        .engine
        .propositions
        .proposition_in_session(session.id, proposition_id)
        .await?;

    // Playlist forwarding happens in the event consumer, driven by the
    // promotion event the engine emits exactly once
    let proposition = context
        .engine
        .propositions
        .promote(proposition_id, &identity)
        .await?;

    Ok(Json(proposition.to_serialized()))
}

async fn delete_proposition(
    Identity(identity): Identity,
    State(context): State<ServerContext>,
    Path((code, proposition_id)): Path<(String, PrimaryKey)>,
) -> ServerResult<()> {
    let session = context.engine.sessions.session_by_code(&code).await?;

    context
        .engine
        .propositions
        .proposition_in_session(session.id, proposition_id)
        .await?;

    context
        .engine
        .propositions
        .delete(proposition_id, &identity)
        .await?;

    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/sessions/:code/propositions", post(submit).get(list))
        .route("/sessions/:code/queue", get(queue))
        .route(
            "/sessions/:code/propositions/:id/moderate",
            post(moderate),
        )
        .route("/sessions/:code/propositions/:id/promote", post(promote))
        .route(
            "/sessions/:code/propositions/:id",
            axum::routing::delete(delete_proposition),
        )
}
