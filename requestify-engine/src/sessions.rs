use log::info;
use thiserror::Error;

use crate::{
    same_identity, AuthorizationError, Database, DatabaseError, EngineContext, EngineEvent,
    ModeratorRegistry, NewSession, NewStreamer, PrimaryKey, QueueMode, SessionData, StreamerData,
};

#[derive(Debug, Error)]
pub enum SessionError {
    /// The chosen code doesn't fit the allowed shape
    #[error("Session code must be 3-32 characters of letters, digits or dashes")]
    InvalidCode,
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

/// Manages streamer accounts and their sessions.
pub struct SessionManager<Db, R> {
    context: EngineContext<Db, R>,
}

impl<Db, R> SessionManager<Db, R>
where
    Db: Database,
    R: ModeratorRegistry,
{
    pub fn new(context: &EngineContext<Db, R>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn register_streamer(
        &self,
        new_streamer: NewStreamer,
    ) -> Result<StreamerData, DatabaseError> {
        self.context.db.create_streamer(new_streamer).await
    }

    pub async fn streamer_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<StreamerData, DatabaseError> {
        self.context.db.streamer_by_external_id(external_id).await
    }

    /// Stores or clears the streamer's platform token. Cached moderator
    /// verdicts for that streamer are dropped either way.
    pub async fn set_streamer_token(
        &self,
        streamer_id: PrimaryKey,
        token: Option<&str>,
    ) -> Result<(), DatabaseError> {
        self.context.db.set_streamer_token(streamer_id, token).await?;
        self.context.resolver.invalidate_owner(streamer_id);

        Ok(())
    }

    /// Claims a new session under the given code.
    pub async fn create(&self, new_session: NewSession) -> Result<SessionData, SessionError> {
        if !code_is_valid(&new_session.code) {
            return Err(SessionError::InvalidCode);
        }

        let session = self.context.db.create_session(new_session).await?;

        info!(
            "Session {} created for streamer {}",
            session.code, session.streamer_id
        );

        Ok(session)
    }

    pub async fn session_by_id(&self, session_id: PrimaryKey) -> Result<SessionData, DatabaseError> {
        self.context.db.session_by_id(session_id).await
    }

    pub async fn session_by_code(&self, code: &str) -> Result<SessionData, DatabaseError> {
        self.context.db.session_by_code(code).await
    }

    /// Switches the queue ordering policy. Owner only. Switching into random
    /// mode reshuffles the current queue immediately.
    pub async fn set_queue_mode(
        &self,
        session_id: PrimaryKey,
        actor_id: &str,
        mode: QueueMode,
    ) -> Result<(), SessionError> {
        let session = self.owned_session(session_id, actor_id).await?;

        self.context
            .db
            .set_session_queue_mode(session.id, mode)
            .await?;

        if mode == QueueMode::Random && session.queue_mode != QueueMode::Random {
            self.recompute(session.id, QueueMode::Random).await?;
        }

        info!("Session {} switched to {:?} queue mode", session.code, mode);

        Ok(())
    }

    /// Forces a fresh random permutation of the approved queue. Owner only.
    /// Two consecutive calls produce two independent permutations.
    pub async fn shuffle(
        &self,
        session_id: PrimaryKey,
        actor_id: &str,
    ) -> Result<usize, SessionError> {
        let session = self.owned_session(session_id, actor_id).await?;

        let count = self.recompute(session.id, QueueMode::Random).await?;

        info!("Session {} queue shuffled ({} items)", session.code, count);

        Ok(count)
    }

    /// Owner only.
    pub async fn set_active(
        &self,
        session_id: PrimaryKey,
        actor_id: &str,
        active: bool,
    ) -> Result<(), SessionError> {
        let session = self.owned_session(session_id, actor_id).await?;

        self.context
            .db
            .set_session_active(session.id, active)
            .await?;

        Ok(())
    }

    /// Deletes the session and its propositions. Owner only. History entries
    /// are scoped to the streamer and survive.
    pub async fn delete(&self, session_id: PrimaryKey, actor_id: &str) -> Result<(), SessionError> {
        let session = self.owned_session(session_id, actor_id).await?;

        self.context.db.delete_session(session.id).await?;
        self.context.allocator.forget_session(session.id);

        info!("Session {} deleted", session.code);

        Ok(())
    }

    /// Everything ever added for the streamer, newest first.
    pub async fn history(
        &self,
        streamer_id: PrimaryKey,
    ) -> Result<Vec<crate::HistoryEntryData>, DatabaseError> {
        self.context.db.history_by_streamer(streamer_id).await
    }

    async fn owned_session(
        &self,
        session_id: PrimaryKey,
        actor_id: &str,
    ) -> Result<SessionData, SessionError> {
        let session = self.context.db.session_by_id(session_id).await?;
        let owner = self.context.db.streamer_by_id(session.streamer_id).await?;

        if !same_identity(actor_id, &owner.external_id) {
            return Err(AuthorizationError::OwnerOnly.into());
        }

        Ok(session)
    }

    async fn recompute(
        &self,
        session_id: PrimaryKey,
        mode: QueueMode,
    ) -> Result<usize, DatabaseError> {
        let count = self
            .context
            .allocator
            .recompute(self.context.db.as_ref(), session_id, mode)
            .await?;

        self.context.emit(EngineEvent::QueueRecomputed { session_id, count });

        Ok(count)
    }
}

fn code_is_valid(code: &str) -> bool {
    (3..=32).contains(&code.len())
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::code_is_valid;

    #[test]
    fn codes_are_validated() {
        assert!(code_is_valid("my-room"));
        assert!(code_is_valid("abc"));
        assert!(code_is_valid("Room-42"));
        assert!(!code_is_valid("ab"));
        assert!(!code_is_valid("has space"));
        assert!(!code_is_valid("emoji-🎵"));
        assert!(!code_is_valid(&"x".repeat(33)));
    }
}
