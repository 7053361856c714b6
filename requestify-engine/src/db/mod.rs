use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type BoxedDatabase = Box<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DatabaseError::NotFound {
                resource: _,
                identifier: _
            }
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DatabaseError::Conflict {
                resource: _,
                field: _,
                value: _
            }
        )
    }
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Represents a type that can store and fetch requestify data.
///
/// This is the single source of truth for propositions and history entries.
/// Two guarantees are required of every implementation:
///
/// * `create_proposition` enforces uniqueness of (session, track reference)
///   atomically and reports a violation as [DatabaseError::Conflict].
/// * `set_queue_positions` applies all assignments of one recompute pass
///   atomically with respect to other passes for the same session.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn streamer_by_id(&self, streamer_id: PrimaryKey) -> Result<StreamerData>;
    async fn streamer_by_external_id(&self, external_id: &str) -> Result<StreamerData>;
    async fn create_streamer(&self, new_streamer: NewStreamer) -> Result<StreamerData>;
    /// Stores or clears the streamer's platform access token.
    async fn set_streamer_token(&self, streamer_id: PrimaryKey, token: Option<&str>)
        -> Result<()>;

    async fn session_by_id(&self, session_id: PrimaryKey) -> Result<SessionData>;
    /// Codes are matched case-insensitively.
    async fn session_by_code(&self, code: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn set_session_queue_mode(&self, session_id: PrimaryKey, mode: QueueMode) -> Result<()>;
    async fn set_session_active(&self, session_id: PrimaryKey, active: bool) -> Result<()>;
    async fn delete_session(&self, session_id: PrimaryKey) -> Result<()>;

    async fn proposition_by_id(&self, proposition_id: PrimaryKey) -> Result<PropositionData>;
    async fn propositions_by_session(&self, session_id: PrimaryKey)
        -> Result<Vec<PropositionData>>;
    /// All propositions of the session currently in `Approved` status.
    async fn approved_propositions(&self, session_id: PrimaryKey) -> Result<Vec<PropositionData>>;
    /// Fast-path duplicate probe used by the eligibility check.
    async fn session_has_track(&self, session_id: PrimaryKey, track_ref: &str) -> Result<bool>;
    async fn create_proposition(&self, new_proposition: NewProposition)
        -> Result<PropositionData>;
    /// Stamps a moderation decision, conditional on the proposition still
    /// being in `expected` status. Clears any queue position, since a
    /// recompute pass reassigns positions for the whole approved set
    /// afterwards. A status that moved on concurrently is reported as
    /// [DatabaseError::Conflict]; check and write must be atomic.
    async fn set_proposition_moderation(
        &self,
        proposition_id: PrimaryKey,
        expected: PropositionStatus,
        status: PropositionStatus,
        moderator_id: &str,
        moderated_at: DateTime<Utc>,
    ) -> Result<PropositionData>;
    /// Returns an `Approved` or `Rejected` proposition to `Pending`, clearing
    /// moderator, moderation timestamp and queue position. Any other status
    /// is a [DatabaseError::Conflict].
    async fn clear_proposition_moderation(
        &self,
        proposition_id: PrimaryKey,
    ) -> Result<PropositionData>;
    /// Marks an `Approved` proposition as `Added`. Any other status is a
    /// [DatabaseError::Conflict].
    async fn set_proposition_added(
        &self,
        proposition_id: PrimaryKey,
        added_at: DateTime<Utc>,
    ) -> Result<PropositionData>;
    /// Writes the queue positions produced by one recompute pass.
    async fn set_queue_positions(
        &self,
        session_id: PrimaryKey,
        assignments: &[(PrimaryKey, i32)],
    ) -> Result<()>;
    async fn delete_proposition(&self, proposition_id: PrimaryKey) -> Result<()>;

    async fn create_history_entry(&self, new_entry: NewHistoryEntry) -> Result<HistoryEntryData>;
    async fn history_contains_track(
        &self,
        streamer_id: PrimaryKey,
        track_ref: &str,
    ) -> Result<bool>;
    async fn history_by_streamer(&self, streamer_id: PrimaryKey) -> Result<Vec<HistoryEntryData>>;
}
