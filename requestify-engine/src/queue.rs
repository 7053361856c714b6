use dashmap::DashMap;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{Database, DatabaseError, PrimaryKey, QueueMode};

/// Recomputes queue positions for the approved propositions of a session.
///
/// Positions are always re-derived from the full approved set rather than
/// maintained incrementally: approvals land out of order, rejections and
/// requeues remove items from the middle, and random mode reshuffles
/// globally. The dense 1-based ordinals fall out of a single pass.
///
/// Passes are serialized per session through an in-process async mutex, so
/// two simultaneous approvals cannot interleave their reads and writes and
/// leave duplicate or missing ordinals. The postgres store adds an advisory
/// lock around the position write for the multi-process case.
#[derive(Default)]
pub struct QueueAllocator {
    locks: DashMap<PrimaryKey, Arc<Mutex<()>>>,
}

impl QueueAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassigns positions 1..=N over the session's approved set and returns N.
    ///
    /// In random mode every call produces a fresh uniform permutation, even
    /// if the approved set did not change.
    pub async fn recompute<Db>(
        &self,
        db: &Db,
        session_id: PrimaryKey,
        mode: QueueMode,
    ) -> Result<usize, DatabaseError>
    where
        Db: Database,
    {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut approved = db.approved_propositions(session_id).await?;

        match mode {
            QueueMode::Chronological => {
                // Tie-break on id so equal timestamps still order deterministically
                approved.sort_by_key(|p| (p.moderated_at, p.id));
            }
            QueueMode::Random => {
                let mut rng = rand::thread_rng();
                approved.shuffle(&mut rng);
            }
        }

        let assignments: Vec<_> = approved
            .iter()
            .enumerate()
            .map(|(index, proposition)| (proposition.id, index as i32 + 1))
            .collect();

        db.set_queue_positions(session_id, &assignments).await?;

        Ok(assignments.len())
    }

    /// Drops the lock of a session that no longer exists. A recompute pass
    /// still in flight keeps its own Arc until it finishes.
    pub fn forget_session(&self, session_id: PrimaryKey) {
        self.locks.remove(&session_id);
    }

    fn session_lock(&self, session_id: PrimaryKey) -> Arc<Mutex<()>> {
        self.locks.entry(session_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryDatabase;

    #[tokio::test]
    async fn forgotten_sessions_leave_no_lock_behind() {
        let allocator = QueueAllocator::new();
        let db = MemoryDatabase::new();

        allocator
            .recompute(&db, 1, QueueMode::Chronological)
            .await
            .unwrap();
        allocator
            .recompute(&db, 2, QueueMode::Chronological)
            .await
            .unwrap();
        assert_eq!(allocator.locks.len(), 2);

        allocator.forget_session(1);
        assert_eq!(allocator.locks.len(), 1);
    }
}
