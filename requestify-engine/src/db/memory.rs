use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{
    Database, DatabaseError, HistoryEntryData, NewHistoryEntry, NewProposition, NewSession,
    NewStreamer, PrimaryKey, PropositionData, PropositionStatus, QueueMode, Result, SessionData,
    StreamerData,
};

/// An in-memory database implementation for requestify.
///
/// All state lives behind a single mutex, which makes every operation atomic
/// with respect to the others. Used in tests and useful for local development
/// without a postgres instance.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_id: PrimaryKey,
    streamers: Vec<StreamerData>,
    sessions: Vec<SessionData>,
    propositions: Vec<PropositionData>,
    history: Vec<HistoryEntryData>,
}

impl State {
    fn next_id(&mut self) -> PrimaryKey {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(resource: &'static str, identifier: &'static str) -> DatabaseError {
    DatabaseError::NotFound {
        resource,
        identifier,
    }
}

fn conflict(resource: &'static str, field: &'static str, value: &str) -> DatabaseError {
    DatabaseError::Conflict {
        resource,
        field,
        value: value.to_string(),
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn streamer_by_id(&self, streamer_id: PrimaryKey) -> Result<StreamerData> {
        self.state
            .lock()
            .streamers
            .iter()
            .find(|s| s.id == streamer_id)
            .cloned()
            .ok_or(not_found("streamer", "id"))
    }

    async fn streamer_by_external_id(&self, external_id: &str) -> Result<StreamerData> {
        self.state
            .lock()
            .streamers
            .iter()
            .find(|s| s.external_id == external_id)
            .cloned()
            .ok_or(not_found("streamer", "external_id"))
    }

    async fn create_streamer(&self, new_streamer: NewStreamer) -> Result<StreamerData> {
        let mut state = self.state.lock();

        if state
            .streamers
            .iter()
            .any(|s| s.external_id == new_streamer.external_id)
        {
            return Err(conflict("streamer", "external_id", &new_streamer.external_id));
        }

        let streamer = StreamerData {
            id: state.next_id(),
            external_id: new_streamer.external_id,
            display_name: new_streamer.display_name,
            access_token: None,
        };

        state.streamers.push(streamer.clone());
        Ok(streamer)
    }

    async fn set_streamer_token(
        &self,
        streamer_id: PrimaryKey,
        token: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.lock();

        let streamer = state
            .streamers
            .iter_mut()
            .find(|s| s.id == streamer_id)
            .ok_or(not_found("streamer", "id"))?;

        streamer.access_token = token.map(|t| t.to_string());
        Ok(())
    }

    async fn session_by_id(&self, session_id: PrimaryKey) -> Result<SessionData> {
        self.state
            .lock()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .ok_or(not_found("session", "id"))
    }

    async fn session_by_code(&self, code: &str) -> Result<SessionData> {
        self.state
            .lock()
            .sessions
            .iter()
            .find(|s| s.code.eq_ignore_ascii_case(code))
            .cloned()
            .ok_or(not_found("session", "code"))
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let mut state = self.state.lock();

        if state
            .sessions
            .iter()
            .any(|s| s.code.eq_ignore_ascii_case(&new_session.code))
        {
            return Err(conflict("session", "code", &new_session.code));
        }

        let session = SessionData {
            id: state.next_id(),
            code: new_session.code,
            streamer_id: new_session.streamer_id,
            active: true,
            prevent_duplicates: new_session.prevent_duplicates,
            queue_mode: new_session.queue_mode,
            is_private: new_session.is_private,
            playlist_ref: new_session.playlist_ref,
        };

        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn set_session_queue_mode(&self, session_id: PrimaryKey, mode: QueueMode) -> Result<()> {
        let mut state = self.state.lock();

        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or(not_found("session", "id"))?;

        session.queue_mode = mode;
        Ok(())
    }

    async fn set_session_active(&self, session_id: PrimaryKey, active: bool) -> Result<()> {
        let mut state = self.state.lock();

        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or(not_found("session", "id"))?;

        session.active = active;
        Ok(())
    }

    async fn delete_session(&self, session_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        if !state.sessions.iter().any(|s| s.id == session_id) {
            return Err(not_found("session", "id"));
        }

        state.sessions.retain(|s| s.id != session_id);
        state.propositions.retain(|p| p.session_id != session_id);
        Ok(())
    }

    async fn proposition_by_id(&self, proposition_id: PrimaryKey) -> Result<PropositionData> {
        self.state
            .lock()
            .propositions
            .iter()
            .find(|p| p.id == proposition_id)
            .cloned()
            .ok_or(not_found("proposition", "id"))
    }

    async fn propositions_by_session(
        &self,
        session_id: PrimaryKey,
    ) -> Result<Vec<PropositionData>> {
        Ok(self
            .state
            .lock()
            .propositions
            .iter()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn approved_propositions(&self, session_id: PrimaryKey) -> Result<Vec<PropositionData>> {
        Ok(self
            .state
            .lock()
            .propositions
            .iter()
            .filter(|p| p.session_id == session_id && p.status == PropositionStatus::Approved)
            .cloned()
            .collect())
    }

    async fn session_has_track(&self, session_id: PrimaryKey, track_ref: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .propositions
            .iter()
            .any(|p| p.session_id == session_id && p.track_ref == track_ref))
    }

    async fn create_proposition(
        &self,
        new_proposition: NewProposition,
    ) -> Result<PropositionData> {
        let mut state = self.state.lock();

        // Uniqueness check and insert are atomic under the state lock
        if state.propositions.iter().any(|p| {
            p.session_id == new_proposition.session_id && p.track_ref == new_proposition.track_ref
        }) {
            return Err(conflict(
                "proposition",
                "track_ref",
                &new_proposition.track_ref,
            ));
        }

        let proposition = PropositionData {
            id: state.next_id(),
            session_id: new_proposition.session_id,
            submitter_id: new_proposition.submitter_id,
            track_ref: new_proposition.track_ref,
            track_name: new_proposition.metadata.name,
            artist: new_proposition.metadata.artist,
            album: new_proposition.metadata.album,
            duration: new_proposition.metadata.duration,
            message: new_proposition.message,
            status: PropositionStatus::Pending,
            queue_position: None,
            moderator_id: None,
            moderated_at: None,
            added_at: None,
            submitted_at: Utc::now(),
        };

        state.propositions.push(proposition.clone());
        Ok(proposition)
    }

    async fn set_proposition_moderation(
        &self,
        proposition_id: PrimaryKey,
        expected: PropositionStatus,
        status: PropositionStatus,
        moderator_id: &str,
        moderated_at: DateTime<Utc>,
    ) -> Result<PropositionData> {
        let mut state = self.state.lock();

        let proposition = state
            .propositions
            .iter_mut()
            .find(|p| p.id == proposition_id)
            .ok_or(not_found("proposition", "id"))?;

        // Guard and write are atomic under the state lock
        if proposition.status != expected {
            return Err(conflict("proposition", "status", proposition.status.as_str()));
        }

        proposition.status = status;
        proposition.moderator_id = Some(moderator_id.to_string());
        proposition.moderated_at = Some(moderated_at);
        proposition.queue_position = None;

        Ok(proposition.clone())
    }

    async fn clear_proposition_moderation(
        &self,
        proposition_id: PrimaryKey,
    ) -> Result<PropositionData> {
        let mut state = self.state.lock();

        let proposition = state
            .propositions
            .iter_mut()
            .find(|p| p.id == proposition_id)
            .ok_or(not_found("proposition", "id"))?;

        if !matches!(
            proposition.status,
            PropositionStatus::Approved | PropositionStatus::Rejected
        ) {
            return Err(conflict("proposition", "status", proposition.status.as_str()));
        }

        proposition.status = PropositionStatus::Pending;
        proposition.moderator_id = None;
        proposition.moderated_at = None;
        proposition.queue_position = None;

        Ok(proposition.clone())
    }

    async fn set_proposition_added(
        &self,
        proposition_id: PrimaryKey,
        added_at: DateTime<Utc>,
    ) -> Result<PropositionData> {
        let mut state = self.state.lock();

        let proposition = state
            .propositions
            .iter_mut()
            .find(|p| p.id == proposition_id)
            .ok_or(not_found("proposition", "id"))?;

        if proposition.status != PropositionStatus::Approved {
            return Err(conflict("proposition", "status", proposition.status.as_str()));
        }

        proposition.status = PropositionStatus::Added;
        proposition.added_at = Some(added_at);

        Ok(proposition.clone())
    }

    async fn set_queue_positions(
        &self,
        _session_id: PrimaryKey,
        assignments: &[(PrimaryKey, i32)],
    ) -> Result<()> {
        let mut state = self.state.lock();

        for (proposition_id, position) in assignments {
            if let Some(proposition) = state
                .propositions
                .iter_mut()
                .find(|p| p.id == *proposition_id)
            {
                proposition.queue_position = Some(*position);
            }
        }

        Ok(())
    }

    async fn delete_proposition(&self, proposition_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        if !state.propositions.iter().any(|p| p.id == proposition_id) {
            return Err(not_found("proposition", "id"));
        }

        state.propositions.retain(|p| p.id != proposition_id);
        Ok(())
    }

    async fn create_history_entry(&self, new_entry: NewHistoryEntry) -> Result<HistoryEntryData> {
        let mut state = self.state.lock();

        let entry = HistoryEntryData {
            id: state.next_id(),
            streamer_id: new_entry.streamer_id,
            track_ref: new_entry.track_ref,
            track_name: new_entry.metadata.name,
            artist: new_entry.metadata.artist,
            album: new_entry.metadata.album,
            duration: new_entry.metadata.duration,
            added_at: Utc::now(),
        };

        state.history.push(entry.clone());
        Ok(entry)
    }

    async fn history_contains_track(
        &self,
        streamer_id: PrimaryKey,
        track_ref: &str,
    ) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .history
            .iter()
            .any(|h| h.streamer_id == streamer_id && h.track_ref == track_ref))
    }

    async fn history_by_streamer(&self, streamer_id: PrimaryKey) -> Result<Vec<HistoryEntryData>> {
        // Newest first, matching the postgres ordering
        Ok(self
            .state
            .lock()
            .history
            .iter()
            .rev()
            .filter(|h| h.streamer_id == streamer_id)
            .cloned()
            .collect())
    }
}
