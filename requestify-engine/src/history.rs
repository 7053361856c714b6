use log::info;
use std::sync::Arc;

use crate::{
    Database, DatabaseError, HistoryEntryData, NewHistoryEntry, PrimaryKey, TrackMetadata,
    TrackRef,
};

/// Appends an immutable record when a track is promoted to `added`.
///
/// Entries are scoped to the streamer, not the session, so they survive
/// session deletion and feed the historical duplicate check across every
/// future session of the same streamer.
pub struct HistoryRecorder<Db> {
    db: Arc<Db>,
}

impl<Db> HistoryRecorder<Db>
where
    Db: Database,
{
    pub fn new(db: &Arc<Db>) -> Self {
        Self { db: db.clone() }
    }

    pub async fn record(
        &self,
        streamer_id: PrimaryKey,
        track_ref: &TrackRef,
        metadata: TrackMetadata,
    ) -> Result<HistoryEntryData, DatabaseError> {
        let entry = self
            .db
            .create_history_entry(NewHistoryEntry {
                streamer_id,
                track_ref: track_ref.as_str().to_string(),
                metadata,
            })
            .await?;

        info!(
            "Recorded {} ({}) in history of streamer {}",
            entry.track_name, entry.track_ref, streamer_id
        );

        Ok(entry)
    }
}
