//! All schemas that are exposed from endpoints are defined here
//! along with the conversion impls

use chrono::{DateTime, Utc};
use serde::Serialize;

use requestify_engine::{
    HistoryEntryData, PropositionData, PropositionStatus, QueueMode, SessionData, StreamerData,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Streamer {
    id: i32,
    external_id: String,
    display_name: String,
    /// Whether a platform token is on file, never the token itself
    connected: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: i32,
    code: String,
    streamer_id: i32,
    active: bool,
    prevent_duplicates: bool,
    queue_mode: QueueMode,
    is_private: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposition {
    id: i32,
    session_id: i32,
    submitter_id: String,
    track_ref: String,
    name: String,
    artist: String,
    album: Option<String>,
    duration: f32,
    message: Option<String>,
    status: PropositionStatus,
    queue_position: Option<i32>,
    moderated_at: Option<DateTime<Utc>>,
    added_at: Option<DateTime<Utc>>,
    submitted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    track_ref: String,
    name: String,
    artist: String,
    added_at: DateTime<Utc>,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<Streamer> for StreamerData {
    fn to_serialized(&self) -> Streamer {
        Streamer {
            id: self.id,
            external_id: self.external_id.clone(),
            display_name: self.display_name.clone(),
            connected: self.access_token.is_some(),
        }
    }
}

impl ToSerialized<Session> for SessionData {
    fn to_serialized(&self) -> Session {
        Session {
            id: self.id,
            code: self.code.clone(),
            streamer_id: self.streamer_id,
            active: self.active,
            prevent_duplicates: self.prevent_duplicates,
            queue_mode: self.queue_mode,
            is_private: self.is_private,
        }
    }
}

impl ToSerialized<Proposition> for PropositionData {
    fn to_serialized(&self) -> Proposition {
        Proposition {
            id: self.id,
            session_id: self.session_id,
            submitter_id: self.submitter_id.clone(),
            track_ref: self.track_ref.clone(),
            name: self.track_name.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            duration: self.duration,
            message: self.message.clone(),
            status: self.status,
            queue_position: self.queue_position,
            moderated_at: self.moderated_at,
            added_at: self.added_at,
            submitted_at: self.submitted_at,
        }
    }
}

impl ToSerialized<HistoryEntry> for HistoryEntryData {
    fn to_serialized(&self) -> HistoryEntry {
        HistoryEntry {
            track_ref: self.track_ref.clone(),
            name: self.track_name.clone(),
            artist: self.artist.clone(),
            added_at: self.added_at,
        }
    }
}
