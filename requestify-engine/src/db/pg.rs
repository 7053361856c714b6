use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Error as SqlxError, PgPool};

use super::{
    Database, DatabaseError, DatabaseResult, HistoryEntryData, IntoDatabaseError, NewHistoryEntry,
    NewProposition, NewSession, NewStreamer, PrimaryKey, PropositionData, PropositionStatus,
    QueueMode, Result, SessionData, StreamerData,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// A postgres database implementation for requestify.
///
/// The schema carries a unique index on (session_id, track_ref), which is the
/// authoritative duplicate guard; the application-level eligibility check is
/// only a fast path. Queue position writes take a per-session advisory lock so
/// concurrent recompute passes cannot interleave.
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn streamer_by_id(&self, streamer_id: PrimaryKey) -> Result<StreamerData> {
        sqlx::query_as("SELECT * FROM streamers WHERE id = $1")
            .bind(streamer_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("streamer", "id"))
    }

    async fn streamer_by_external_id(&self, external_id: &str) -> Result<StreamerData> {
        sqlx::query_as("SELECT * FROM streamers WHERE external_id = $1")
            .bind(external_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("streamer", "external_id"))
    }

    async fn create_streamer(&self, new_streamer: NewStreamer) -> Result<StreamerData> {
        sqlx::query_as(
            "INSERT INTO streamers (external_id, display_name) VALUES ($1, $2) RETURNING *",
        )
        .bind(&new_streamer.external_id)
        .bind(&new_streamer.display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "streamer", "external_id", &new_streamer.external_id))
    }

    async fn set_streamer_token(
        &self,
        streamer_id: PrimaryKey,
        token: Option<&str>,
    ) -> Result<()> {
        // Ensure streamer exists
        let _ = self.streamer_by_id(streamer_id).await?;

        sqlx::query("UPDATE streamers SET access_token = $1 WHERE id = $2")
            .bind(token)
            .bind(streamer_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn session_by_id(&self, session_id: PrimaryKey) -> Result<SessionData> {
        sqlx::query_as("SELECT * FROM sessions WHERE id = $1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("session", "id"))
    }

    async fn session_by_code(&self, code: &str) -> Result<SessionData> {
        sqlx::query_as("SELECT * FROM sessions WHERE lower(code) = lower($1)")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("session", "code"))
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_code(&new_session.code)
            .await
            .conflict_or_ok("session", "code", &new_session.code)?;

        sqlx::query_as(
            "
            INSERT INTO sessions (code, streamer_id, prevent_duplicates, queue_mode, is_private, playlist_ref)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *",
        )
        .bind(&new_session.code)
        .bind(new_session.streamer_id)
        .bind(new_session.prevent_duplicates)
        .bind(new_session.queue_mode)
        .bind(new_session.is_private)
        .bind(&new_session.playlist_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "session", "code", &new_session.code))
    }

    async fn set_session_queue_mode(&self, session_id: PrimaryKey, mode: QueueMode) -> Result<()> {
        let _ = self.session_by_id(session_id).await?;

        sqlx::query("UPDATE sessions SET queue_mode = $1 WHERE id = $2")
            .bind(mode)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn set_session_active(&self, session_id: PrimaryKey, active: bool) -> Result<()> {
        let _ = self.session_by_id(session_id).await?;

        sqlx::query("UPDATE sessions SET active = $1 WHERE id = $2")
            .bind(active)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn delete_session(&self, session_id: PrimaryKey) -> Result<()> {
        let _ = self.session_by_id(session_id).await?;

        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn proposition_by_id(&self, proposition_id: PrimaryKey) -> Result<PropositionData> {
        sqlx::query_as("SELECT * FROM propositions WHERE id = $1")
            .bind(proposition_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("proposition", "id"))
    }

    async fn propositions_by_session(
        &self,
        session_id: PrimaryKey,
    ) -> Result<Vec<PropositionData>> {
        sqlx::query_as("SELECT * FROM propositions WHERE session_id = $1 ORDER BY submitted_at")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn approved_propositions(&self, session_id: PrimaryKey) -> Result<Vec<PropositionData>> {
        sqlx::query_as("SELECT * FROM propositions WHERE session_id = $1 AND status = 'approved'")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn session_has_track(&self, session_id: PrimaryKey, track_ref: &str) -> Result<bool> {
        let result =
            sqlx::query("SELECT id FROM propositions WHERE session_id = $1 AND track_ref = $2")
                .bind(session_id)
                .bind(track_ref)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| e.any())?;

        Ok(result.is_some())
    }

    async fn create_proposition(
        &self,
        new_proposition: NewProposition,
    ) -> Result<PropositionData> {
        sqlx::query_as(
            "
            INSERT INTO propositions
                (session_id, submitter_id, track_ref, track_name, artist, album, duration, message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *",
        )
        .bind(new_proposition.session_id)
        .bind(&new_proposition.submitter_id)
        .bind(&new_proposition.track_ref)
        .bind(&new_proposition.metadata.name)
        .bind(&new_proposition.metadata.artist)
        .bind(&new_proposition.metadata.album)
        .bind(new_proposition.metadata.duration)
        .bind(&new_proposition.message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, "proposition", "track_ref", &new_proposition.track_ref)
        })
    }

    async fn set_proposition_moderation(
        &self,
        proposition_id: PrimaryKey,
        expected: PropositionStatus,
        status: PropositionStatus,
        moderator_id: &str,
        moderated_at: DateTime<Utc>,
    ) -> Result<PropositionData> {
        // Conditional on the status so a concurrent decision cannot be
        // overwritten; zero rows means the status moved on under us
        sqlx::query_as(
            "
            UPDATE propositions SET
                status = $1,
                moderator_id = $2,
                moderated_at = $3,
                queue_position = NULL
            WHERE id = $4 AND status = $5
            RETURNING *",
        )
        .bind(status)
        .bind(moderator_id)
        .bind(moderated_at)
        .bind(proposition_id)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?
        .ok_or(stale_status(expected))
    }

    async fn clear_proposition_moderation(
        &self,
        proposition_id: PrimaryKey,
    ) -> Result<PropositionData> {
        sqlx::query_as(
            "
            UPDATE propositions SET
                status = 'pending',
                moderator_id = NULL,
                moderated_at = NULL,
                queue_position = NULL
            WHERE id = $1 AND status IN ('approved', 'rejected')
            RETURNING *",
        )
        .bind(proposition_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?
        .ok_or(stale_status(PropositionStatus::Approved))
    }

    async fn set_proposition_added(
        &self,
        proposition_id: PrimaryKey,
        added_at: DateTime<Utc>,
    ) -> Result<PropositionData> {
        sqlx::query_as(
            "
            UPDATE propositions SET status = 'added', added_at = $1
            WHERE id = $2 AND status = 'approved'
            RETURNING *",
        )
        .bind(added_at)
        .bind(proposition_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?
        .ok_or(stale_status(PropositionStatus::Approved))
    }

    async fn set_queue_positions(
        &self,
        session_id: PrimaryKey,
        assignments: &[(PrimaryKey, i32)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        // Serializes recompute passes for this session across processes
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(session_id as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        for (proposition_id, position) in assignments {
            sqlx::query("UPDATE propositions SET queue_position = $1 WHERE id = $2")
                .bind(position)
                .bind(proposition_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;
        }

        tx.commit().await.map_err(|e| e.any())
    }

    async fn delete_proposition(&self, proposition_id: PrimaryKey) -> Result<()> {
        // Ensure proposition exists
        let _ = self.proposition_by_id(proposition_id).await?;

        sqlx::query("DELETE FROM propositions WHERE id = $1")
            .bind(proposition_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn create_history_entry(&self, new_entry: NewHistoryEntry) -> Result<HistoryEntryData> {
        sqlx::query_as(
            "
            INSERT INTO history_entries
                (streamer_id, track_ref, track_name, artist, album, duration)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *",
        )
        .bind(new_entry.streamer_id)
        .bind(&new_entry.track_ref)
        .bind(&new_entry.metadata.name)
        .bind(&new_entry.metadata.artist)
        .bind(&new_entry.metadata.album)
        .bind(new_entry.metadata.duration)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn history_contains_track(
        &self,
        streamer_id: PrimaryKey,
        track_ref: &str,
    ) -> Result<bool> {
        let result =
            sqlx::query("SELECT id FROM history_entries WHERE streamer_id = $1 AND track_ref = $2")
                .bind(streamer_id)
                .bind(track_ref)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| e.any())?;

        Ok(result.is_some())
    }

    async fn history_by_streamer(&self, streamer_id: PrimaryKey) -> Result<Vec<HistoryEntryData>> {
        sqlx::query_as(
            "SELECT * FROM history_entries WHERE streamer_id = $1 ORDER BY added_at DESC",
        )
        .bind(streamer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }
}

/// The conflict a conditional status write produces when zero rows matched.
/// Callers re-read the proposition to tell a vanished row from a stale one.
fn stale_status(expected: PropositionStatus) -> DatabaseError {
    DatabaseError::Conflict {
        resource: "proposition",
        field: "status",
        value: expected.as_str().to_string(),
    }
}

/// Maps a storage-level unique violation to the same conflict the
/// application-level pre-check produces.
fn conflict_on_unique(
    error: SqlxError,
    resource: &'static str,
    field: &'static str,
    value: &str,
) -> DatabaseError {
    match &error {
        SqlxError::Database(e) if e.is_unique_violation() => DatabaseError::Conflict {
            resource,
            field,
            value: value.to_string(),
        },
        _ => error.any(),
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
