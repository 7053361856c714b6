use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TrackMetadata;

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// How queue positions are assigned to approved propositions of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    Chronological,
    Random,
}

/// The lifecycle state of a proposition. Deletion is a hard removal, not a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PropositionStatus {
    Pending,
    Approved,
    Rejected,
    Added,
}

impl PropositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Added => "added",
        }
    }
}

/// A streamer account.
///
/// `external_id` is the broadcaster identity on the streaming platform, and
/// `access_token` is the platform token used to query the moderator registry.
/// A streamer that never connected the platform simply has no token on file.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StreamerData {
    pub id: PrimaryKey,
    pub external_id: String,
    pub display_name: String,
    pub access_token: Option<String>,
}

/// A streamer-owned room grouping propositions under one queue.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// Human-chosen code used to identify the session. Globally unique,
    /// case-insensitive, immutable once claimed.
    pub code: String,
    pub streamer_id: PrimaryKey,
    pub active: bool,
    /// When true, tracks already in the streamer's history cannot be proposed again.
    pub prevent_duplicates: bool,
    pub queue_mode: QueueMode,
    pub is_private: bool,
    /// The playlist promotions are forwarded to, if the streamer configured one.
    pub playlist_ref: Option<String>,
}

/// A single track nomination inside a session.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PropositionData {
    pub id: PrimaryKey,
    pub session_id: PrimaryKey,
    /// External identity of the viewer who submitted the track.
    pub submitter_id: String,
    /// Canonical track reference, see [crate::TrackRef].
    pub track_ref: String,
    pub track_name: String,
    pub artist: String,
    pub album: Option<String>,
    /// Track duration in seconds.
    pub duration: f32,
    pub message: Option<String>,
    pub status: PropositionStatus,
    /// Meaningful only while `status` is `Approved`.
    pub queue_position: Option<i32>,
    pub moderator_id: Option<String>,
    pub moderated_at: Option<DateTime<Utc>>,
    pub added_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
}

impl PropositionData {
    pub fn metadata(&self) -> TrackMetadata {
        TrackMetadata {
            name: self.track_name.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            duration: self.duration,
        }
    }
}

/// An immutable record of a track once it reached `added`, scoped to the
/// streamer so it survives session deletion.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryEntryData {
    pub id: PrimaryKey,
    pub streamer_id: PrimaryKey,
    pub track_ref: String,
    pub track_name: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: f32,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewStreamer {
    pub external_id: String,
    pub display_name: String,
}

#[derive(Debug)]
pub struct NewSession {
    pub code: String,
    pub streamer_id: PrimaryKey,
    pub prevent_duplicates: bool,
    pub queue_mode: QueueMode,
    pub is_private: bool,
    pub playlist_ref: Option<String>,
}

#[derive(Debug)]
pub struct NewProposition {
    pub session_id: PrimaryKey,
    pub submitter_id: String,
    pub track_ref: String,
    pub metadata: TrackMetadata,
    pub message: Option<String>,
}

#[derive(Debug)]
pub struct NewHistoryEntry {
    pub streamer_id: PrimaryKey,
    pub track_ref: String,
    pub metadata: TrackMetadata,
}
