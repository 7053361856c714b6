use thiserror::Error;

use crate::{Database, DatabaseError, SessionData, TrackRef};

/// Why a submission was refused. Always safe to surface verbatim to the
/// submitting viewer.
#[derive(Debug, Error)]
pub enum EligibilityError {
    /// The track is already proposed in this session
    #[error("This track is already in the session")]
    DuplicateInSession,

    /// The track was already added for this streamer at some point
    #[error("This track was already played before")]
    DuplicateInHistory,

    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

/// Decides whether a new proposition may be created for the given track.
///
/// This is the friendly fast path. The store's uniqueness constraint on
/// (session, track reference) remains the authoritative guard, so a
/// concurrent submission slipping past this check still fails on insert.
pub async fn check_eligible<Db>(
    db: &Db,
    session: &SessionData,
    track_ref: &TrackRef,
) -> Result<(), EligibilityError>
where
    Db: Database,
{
    let in_session = db
        .session_has_track(session.id, track_ref.as_str())
        .await
        .map_err(EligibilityError::Db)?;

    if in_session {
        return Err(EligibilityError::DuplicateInSession);
    }

    if session.prevent_duplicates {
        let in_history = db
            .history_contains_track(session.streamer_id, track_ref.as_str())
            .await
            .map_err(EligibilityError::Db)?;

        if in_history {
            return Err(EligibilityError::DuplicateInHistory);
        }
    }

    Ok(())
}
