use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use log::{debug, warn};
use std::sync::Arc;
use thiserror::Error;

use crate::{Database, DatabaseError, ModeratorRegistry, PrimaryKey, RegistryError, SessionData};

/// How long a registry verdict may be reused before a live re-check.
/// Long enough to absorb a burst of moderation actions, short enough that a
/// revoked moderator loses access promptly.
const VERDICT_TTL_SECONDS: i64 = 30;

#[derive(Debug, Error)]
pub enum AuthorizationError {
    /// The actor is neither the session owner nor a recognized moderator
    #[error("Not the owner or a moderator of this session")]
    NotOwnerOrModerator,

    /// The operation is reserved for the session owner
    #[error("Only the owner of this session may do this")]
    OwnerOnly,

    /// The actor is neither the session owner nor the original submitter
    #[error("Not the owner of this session or the submitter")]
    NotOwnerOrSubmitter,
}

/// Decides whether a user may moderate a session.
///
/// The session owner always may, with no external call. Anyone else must
/// appear in the owner's externally-sourced moderator list, which requires
/// the owner to have a platform token on file. Registry failures degrade to
/// "not authorized" for that request, never to a failed operation.
pub struct ModeratorResolver<Db, R> {
    db: Arc<Db>,
    registry: Arc<R>,
    cache: DashMap<(String, PrimaryKey), CachedVerdict>,
    ttl: Duration,
}

#[derive(Debug, Clone, Copy)]
struct CachedVerdict {
    verdict: bool,
    fetched_at: DateTime<Utc>,
}

impl<Db, R> ModeratorResolver<Db, R>
where
    Db: Database,
    R: ModeratorRegistry,
{
    pub fn new(db: &Arc<Db>, registry: &Arc<R>) -> Self {
        Self::with_ttl(db, registry, Duration::seconds(VERDICT_TTL_SECONDS))
    }

    /// Lets tests control how long verdicts stay fresh.
    pub fn with_ttl(db: &Arc<Db>, registry: &Arc<R>, ttl: Duration) -> Self {
        Self {
            db: db.clone(),
            registry: registry.clone(),
            cache: Default::default(),
            ttl,
        }
    }

    /// Returns true if the candidate may moderate the given session.
    ///
    /// Database errors propagate; registry errors do not.
    pub async fn is_authorized(
        &self,
        candidate_id: &str,
        session: &SessionData,
    ) -> Result<bool, DatabaseError> {
        let owner = self.db.streamer_by_id(session.streamer_id).await?;

        if same_identity(candidate_id, &owner.external_id) {
            return Ok(true);
        }

        let Some(token) = owner.access_token.as_deref() else {
            // A never-connected streamer simply has no moderators recognized
            debug!(
                "No token on file for streamer {}, denying moderation",
                owner.external_id
            );
            return Ok(false);
        };

        let key = (canonical_identity(candidate_id), owner.id);

        if let Some(cached) = self.cache.get(&key) {
            if Utc::now() - cached.fetched_at < self.ttl {
                return Ok(cached.verdict);
            }
        }

        let moderators = match self
            .registry
            .list_moderators(&owner.external_id, token)
            .await
        {
            Ok(moderators) => moderators,
            Err(e) => {
                log_registry_failure(&owner.external_id, &e);
                return Ok(false);
            }
        };

        let verdict = moderators.iter().any(|m| same_identity(m, candidate_id));

        // Sweep entries past their TTL while we hold a fresh timestamp, so
        // the cache stays bounded by the set of recently active candidates
        let now = Utc::now();
        self.cache.retain(|_, cached| now - cached.fetched_at < self.ttl);

        self.cache.insert(
            key,
            CachedVerdict {
                verdict,
                fetched_at: now,
            },
        );

        Ok(verdict)
    }

    /// Drops every cached verdict for the given owner. Called whenever the
    /// owner's platform token is refreshed or cleared.
    pub fn invalidate_owner(&self, streamer_id: PrimaryKey) {
        self.cache.retain(|(_, owner_id), _| *owner_id != streamer_id);
    }
}

/// Distinguishable in logs for operational triage, uniform for the caller.
fn log_registry_failure(broadcaster_id: &str, error: &RegistryError) {
    match error {
        RegistryError::Unauthenticated => warn!(
            "Owner token for broadcaster {} was rejected, denying moderation",
            broadcaster_id
        ),
        RegistryError::Forbidden => warn!(
            "Owner token for broadcaster {} lacks the moderation scope, denying moderation",
            broadcaster_id
        ),
        RegistryError::BadRequest(body) => warn!(
            "Registry rejected the moderator lookup for broadcaster {}: {}",
            broadcaster_id, body
        ),
        RegistryError::Unavailable(cause) => warn!(
            "Registry unreachable while resolving moderators of broadcaster {}: {}",
            broadcaster_id, cause
        ),
    }
}

/// Compares two external identities, tolerating numeric-vs-string
/// representations of the same identity.
pub fn same_identity(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }

    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn canonical_identity(id: &str) -> String {
    id.parse::<u64>()
        .map(|n| n.to_string())
        .unwrap_or_else(|_| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryDatabase, NewSession, NewStreamer, QueueMode};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A registry that returns a canned list, or a canned error, and counts
    /// how often it was asked.
    struct FakeRegistry {
        moderators: Vec<String>,
        error: Option<fn() -> RegistryError>,
        calls: AtomicUsize,
    }

    impl FakeRegistry {
        fn listing(moderators: &[&str]) -> Self {
            Self {
                moderators: moderators.iter().map(|m| m.to_string()).collect(),
                error: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(error: fn() -> RegistryError) -> Self {
            Self {
                moderators: vec![],
                error: Some(error),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModeratorRegistry for FakeRegistry {
        async fn list_moderators(
            &self,
            _broadcaster_id: &str,
            _access_token: &str,
        ) -> Result<Vec<String>, RegistryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            match self.error {
                Some(error) => Err(error()),
                None => Ok(self.moderators.clone()),
            }
        }
    }

    async fn setup(registry: FakeRegistry, token: Option<&str>) -> TestSetup {
        let db = Arc::new(MemoryDatabase::new());
        let registry = Arc::new(registry);

        let streamer = db
            .create_streamer(NewStreamer {
                external_id: "1000".to_string(),
                display_name: "streamer".to_string(),
            })
            .await
            .unwrap();

        db.set_streamer_token(streamer.id, token).await.unwrap();

        let session = db
            .create_session(NewSession {
                code: "lobby".to_string(),
                streamer_id: streamer.id,
                prevent_duplicates: false,
                queue_mode: QueueMode::Chronological,
                is_private: false,
                playlist_ref: None,
            })
            .await
            .unwrap();

        TestSetup {
            resolver: ModeratorResolver::new(&db, &registry),
            registry,
            session,
        }
    }

    struct TestSetup {
        resolver: ModeratorResolver<MemoryDatabase, FakeRegistry>,
        registry: Arc<FakeRegistry>,
        session: SessionData,
    }

    #[test]
    fn identities_compare_numerically() {
        assert!(same_identity("0042", "42"));
        assert!(same_identity("42", "42"));
        assert!(!same_identity("42", "43"));
        assert!(same_identity("alice", "alice"));
        assert!(!same_identity("alice", "bob"));
    }

    #[tokio::test]
    async fn owner_is_authorized_without_external_call() {
        let setup = setup(FakeRegistry::listing(&[]), Some("token")).await;

        assert!(setup
            .resolver
            .is_authorized("1000", &setup.session)
            .await
            .unwrap());
        assert_eq!(setup.registry.calls(), 0);
    }

    #[tokio::test]
    async fn owner_is_authorized_even_when_registry_errors() {
        let setup = setup(
            FakeRegistry::failing(|| RegistryError::Unauthenticated),
            Some("token"),
        )
        .await;

        assert!(setup
            .resolver
            .is_authorized("1000", &setup.session)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn listed_moderator_is_authorized() {
        let setup = setup(FakeRegistry::listing(&["2000"]), Some("token")).await;

        assert!(setup
            .resolver
            .is_authorized("2000", &setup.session)
            .await
            .unwrap());
        assert!(!setup
            .resolver
            .is_authorized("3000", &setup.session)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_owner_token_denies_without_external_call() {
        let setup = setup(FakeRegistry::listing(&["2000"]), None).await;

        assert!(!setup
            .resolver
            .is_authorized("2000", &setup.session)
            .await
            .unwrap());
        assert_eq!(setup.registry.calls(), 0);
    }

    #[tokio::test]
    async fn registry_failure_degrades_to_denial() {
        let setup = setup(
            FakeRegistry::failing(|| RegistryError::Unavailable("down".to_string())),
            Some("token"),
        )
        .await;

        assert!(!setup
            .resolver
            .is_authorized("2000", &setup.session)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn verdicts_are_cached_within_ttl() {
        let setup = setup(FakeRegistry::listing(&["2000"]), Some("token")).await;

        for _ in 0..3 {
            setup
                .resolver
                .is_authorized("2000", &setup.session)
                .await
                .unwrap();
        }

        assert_eq!(setup.registry.calls(), 1);
    }

    #[tokio::test]
    async fn expired_verdicts_are_refetched() {
        let db = Arc::new(MemoryDatabase::new());
        let registry = Arc::new(FakeRegistry::listing(&["2000"]));

        let streamer = db
            .create_streamer(NewStreamer {
                external_id: "1000".to_string(),
                display_name: "streamer".to_string(),
            })
            .await
            .unwrap();
        db.set_streamer_token(streamer.id, Some("token"))
            .await
            .unwrap();

        let session = db
            .create_session(NewSession {
                code: "lobby".to_string(),
                streamer_id: streamer.id,
                prevent_duplicates: false,
                queue_mode: QueueMode::Chronological,
                is_private: false,
                playlist_ref: None,
            })
            .await
            .unwrap();

        let resolver = ModeratorResolver::with_ttl(&db, &registry, Duration::zero());

        resolver.is_authorized("2000", &session).await.unwrap();
        resolver.is_authorized("2000", &session).await.unwrap();

        assert_eq!(registry.calls(), 2);
    }

    #[tokio::test]
    async fn expired_verdicts_are_swept_from_the_cache() {
        let db = Arc::new(MemoryDatabase::new());
        let registry = Arc::new(FakeRegistry::listing(&["2000"]));

        let streamer = db
            .create_streamer(NewStreamer {
                external_id: "1000".to_string(),
                display_name: "streamer".to_string(),
            })
            .await
            .unwrap();
        db.set_streamer_token(streamer.id, Some("token"))
            .await
            .unwrap();

        let session = db
            .create_session(NewSession {
                code: "lobby".to_string(),
                streamer_id: streamer.id,
                prevent_duplicates: false,
                queue_mode: QueueMode::Chronological,
                is_private: false,
                playlist_ref: None,
            })
            .await
            .unwrap();

        let resolver = ModeratorResolver::with_ttl(&db, &registry, Duration::zero());

        // Each lookup sweeps the previous, already-expired verdict
        resolver.is_authorized("2000", &session).await.unwrap();
        resolver.is_authorized("3000", &session).await.unwrap();

        assert_eq!(resolver.cache.len(), 1);
    }

    #[tokio::test]
    async fn invalidation_forces_a_live_recheck() {
        let setup = setup(FakeRegistry::listing(&["2000"]), Some("token")).await;

        setup
            .resolver
            .is_authorized("2000", &setup.session)
            .await
            .unwrap();
        setup.resolver.invalidate_owner(setup.session.streamer_id);
        setup
            .resolver
            .is_authorized("2000", &setup.session)
            .await
            .unwrap();

        assert_eq!(setup.registry.calls(), 2);
    }
}
