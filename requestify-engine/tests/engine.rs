use async_trait::async_trait;
use std::collections::HashSet;

use requestify_engine::{
    AuthorizationError, EligibilityError, Engine, EngineEvent, MemoryDatabase, ModerationAction,
    ModeratorRegistry, NewSession, NewStreamer, NewSubmission, PrimaryKey, PropositionData,
    PropositionError, PropositionStatus, QueueMode, RegistryError, SessionData, StateError,
    TrackMetadata,
};

const OWNER: &str = "1000";
const MODERATOR: &str = "2000";
const VIEWER: &str = "3000";

/// Returns a canned moderator list without ever talking to the network.
struct CannedRegistry(Vec<String>);

#[async_trait]
impl ModeratorRegistry for CannedRegistry {
    async fn list_moderators(
        &self,
        _broadcaster_id: &str,
        _access_token: &str,
    ) -> Result<Vec<String>, RegistryError> {
        Ok(self.0.clone())
    }
}

/// Fails every lookup, simulating a registry outage.
struct FailingRegistry;

#[async_trait]
impl ModeratorRegistry for FailingRegistry {
    async fn list_moderators(
        &self,
        _broadcaster_id: &str,
        _access_token: &str,
    ) -> Result<Vec<String>, RegistryError> {
        Err(RegistryError::Unavailable("registry is down".to_string()))
    }
}

async fn setup_with<R>(
    registry: R,
    prevent_duplicates: bool,
    queue_mode: QueueMode,
) -> (Engine<MemoryDatabase, R>, SessionData)
where
    R: ModeratorRegistry,
{
    let engine = Engine::new(MemoryDatabase::new(), registry);

    let streamer = engine
        .sessions
        .register_streamer(NewStreamer {
            external_id: OWNER.to_string(),
            display_name: "streamer".to_string(),
        })
        .await
        .unwrap();

    engine
        .sessions
        .set_streamer_token(streamer.id, Some("token"))
        .await
        .unwrap();

    let session = engine
        .sessions
        .create(NewSession {
            code: "lobby".to_string(),
            streamer_id: streamer.id,
            prevent_duplicates,
            queue_mode,
            is_private: false,
            playlist_ref: None,
        })
        .await
        .unwrap();

    (engine, session)
}

async fn setup(
    prevent_duplicates: bool,
    queue_mode: QueueMode,
) -> (Engine<MemoryDatabase, CannedRegistry>, SessionData) {
    setup_with(
        CannedRegistry(vec![MODERATOR.to_string()]),
        prevent_duplicates,
        queue_mode,
    )
    .await
}

fn track(id: &str) -> NewSubmissionParts {
    NewSubmissionParts {
        track_ref: format!("https://open.spotify.com/track/{id}"),
        metadata: TrackMetadata {
            name: format!("Track {id}"),
            artist: "Artist".to_string(),
            album: None,
            duration: 180.0,
        },
    }
}

struct NewSubmissionParts {
    track_ref: String,
    metadata: TrackMetadata,
}

impl NewSubmissionParts {
    fn submission(self, session_id: PrimaryKey, viewer: &str) -> NewSubmission {
        NewSubmission {
            session_id,
            viewer_id: viewer.to_string(),
            track_ref: self.track_ref,
            metadata: self.metadata,
            message: None,
        }
    }
}

async fn submit<R>(
    engine: &Engine<MemoryDatabase, R>,
    session: &SessionData,
    id: &str,
) -> Result<PropositionData, PropositionError>
where
    R: ModeratorRegistry,
{
    engine
        .propositions
        .submit(track(id).submission(session.id, VIEWER))
        .await
}

fn positions(queue: &[PropositionData]) -> Vec<i32> {
    queue.iter().map(|p| p.queue_position.unwrap()).collect()
}

#[tokio::test]
async fn concurrent_submissions_of_same_track_yield_one_proposition() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    let (first, second) = tokio::join!(
        submit(&engine, &session, "abc123"),
        submit(&engine, &session, "abc123"),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);

    let duplicate = if first.is_err() { first } else { second };
    assert!(matches!(
        duplicate.unwrap_err(),
        PropositionError::Eligibility(EligibilityError::DuplicateInSession)
    ));
}

#[tokio::test]
async fn equivalent_track_urls_are_session_duplicates() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    submit(&engine, &session, "abc123").await.unwrap();

    let result = engine
        .propositions
        .submit(NewSubmission {
            session_id: session.id,
            viewer_id: VIEWER.to_string(),
            track_ref: "https://open.spotify.com/track/abc123?si=share".to_string(),
            metadata: track("abc123").metadata,
            message: None,
        })
        .await;

    assert!(matches!(
        result.unwrap_err(),
        PropositionError::Eligibility(EligibilityError::DuplicateInSession)
    ));
}

#[tokio::test]
async fn promoted_tracks_are_excluded_across_sessions_of_the_streamer() {
    let (engine, session) = setup(true, QueueMode::Chronological).await;

    let proposition = submit(&engine, &session, "abc123").await.unwrap();

    let approved = engine
        .propositions
        .moderate(proposition.id, OWNER, ModerationAction::Approve)
        .await
        .unwrap();
    assert_eq!(approved.status, PropositionStatus::Approved);
    assert_eq!(approved.queue_position, Some(1));

    let added = engine.propositions.promote(approved.id, OWNER).await.unwrap();
    assert_eq!(added.status, PropositionStatus::Added);
    assert!(added.added_at.is_some());

    // A fresh session of the same streamer still refuses the track
    let second_session = engine
        .sessions
        .create(NewSession {
            code: "second".to_string(),
            streamer_id: session.streamer_id,
            prevent_duplicates: true,
            queue_mode: QueueMode::Chronological,
            is_private: false,
            playlist_ref: None,
        })
        .await
        .unwrap();

    let result = submit(&engine, &second_session, "abc123").await;

    assert!(matches!(
        result.unwrap_err(),
        PropositionError::Eligibility(EligibilityError::DuplicateInHistory)
    ));
}

#[tokio::test]
async fn history_exclusion_is_off_without_prevent_duplicates() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    let proposition = submit(&engine, &session, "abc123").await.unwrap();
    engine
        .propositions
        .moderate(proposition.id, OWNER, ModerationAction::Approve)
        .await
        .unwrap();
    engine
        .propositions
        .promote(proposition.id, OWNER)
        .await
        .unwrap();

    let second_session = engine
        .sessions
        .create(NewSession {
            code: "second".to_string(),
            streamer_id: session.streamer_id,
            prevent_duplicates: false,
            queue_mode: QueueMode::Chronological,
            is_private: false,
            playlist_ref: None,
        })
        .await
        .unwrap();

    assert!(submit(&engine, &second_session, "abc123").await.is_ok());
}

#[tokio::test]
async fn illegal_transitions_fail_with_state_errors() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    let proposition = submit(&engine, &session, "abc123").await.unwrap();

    // Promote requires approved
    assert!(matches!(
        engine
            .propositions
            .promote(proposition.id, OWNER)
            .await
            .unwrap_err(),
        PropositionError::State(StateError::NotApproved)
    ));

    // Requeue of a pending proposition is a no-op the engine refuses
    assert!(matches!(
        engine
            .propositions
            .moderate(proposition.id, OWNER, ModerationAction::Requeue)
            .await
            .unwrap_err(),
        PropositionError::State(StateError::AlreadyPending)
    ));

    engine
        .propositions
        .moderate(proposition.id, OWNER, ModerationAction::Approve)
        .await
        .unwrap();

    // Approve twice
    assert!(matches!(
        engine
            .propositions
            .moderate(proposition.id, OWNER, ModerationAction::Approve)
            .await
            .unwrap_err(),
        PropositionError::State(StateError::AlreadyModerated)
    ));

    engine
        .propositions
        .promote(proposition.id, OWNER)
        .await
        .unwrap();

    // Nothing moves out of added
    for action in [
        ModerationAction::Approve,
        ModerationAction::Reject,
        ModerationAction::Requeue,
    ] {
        assert!(matches!(
            engine
                .propositions
                .moderate(proposition.id, OWNER, action)
                .await
                .unwrap_err(),
            PropositionError::State(StateError::AlreadyAdded)
        ));
    }

    // Unknown proposition
    assert!(matches!(
        engine
            .propositions
            .moderate(9999, OWNER, ModerationAction::Approve)
            .await
            .unwrap_err(),
        PropositionError::State(StateError::NotFound)
    ));
}

#[tokio::test]
async fn concurrent_moderation_applies_exactly_one_decision() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    let proposition = submit(&engine, &session, "abc123").await.unwrap();

    // Both read the pending status before either writes; the conditional
    // store write lets only one decision land
    let (approve, reject) = tokio::join!(
        engine
            .propositions
            .moderate(proposition.id, OWNER, ModerationAction::Approve),
        engine
            .propositions
            .moderate(proposition.id, OWNER, ModerationAction::Reject),
    );

    let successes = [approve.is_ok(), reject.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(successes, 1);

    let loser = if approve.is_err() { approve } else { reject };
    assert!(matches!(
        loser.unwrap_err(),
        PropositionError::State(StateError::AlreadyModerated)
    ));
}

#[tokio::test]
async fn inactive_sessions_refuse_submissions() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    engine
        .sessions
        .set_active(session.id, OWNER, false)
        .await
        .unwrap();

    assert!(matches!(
        submit(&engine, &session, "abc123").await.unwrap_err(),
        PropositionError::State(StateError::SessionInactive)
    ));
}

#[tokio::test]
async fn ordinals_stay_dense_through_the_lifecycle() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    let mut ids = Vec::new();
    for track_id in ["t1", "t2", "t3", "t4"] {
        let proposition = submit(&engine, &session, track_id).await.unwrap();
        ids.push(proposition.id);
    }

    for id in &ids {
        engine
            .propositions
            .moderate(*id, MODERATOR, ModerationAction::Approve)
            .await
            .unwrap();
    }

    let queue = engine.propositions.queue(session.id).await.unwrap();
    assert_eq!(positions(&queue), vec![1, 2, 3, 4]);
    // Chronological order follows moderation order
    assert_eq!(queue.iter().map(|p| p.id).collect::<Vec<_>>(), ids);

    // Pulling one out of the middle closes the gap
    engine
        .propositions
        .moderate(ids[1], OWNER, ModerationAction::Reject)
        .await
        .unwrap();

    let queue = engine.propositions.queue(session.id).await.unwrap();
    assert_eq!(positions(&queue), vec![1, 2, 3]);

    // Requeue then re-approve moves the item to the tail
    engine
        .propositions
        .moderate(ids[0], MODERATOR, ModerationAction::Requeue)
        .await
        .unwrap();
    engine
        .propositions
        .moderate(ids[0], MODERATOR, ModerationAction::Approve)
        .await
        .unwrap();

    let queue = engine.propositions.queue(session.id).await.unwrap();
    assert_eq!(positions(&queue), vec![1, 2, 3]);
    assert_eq!(queue.last().unwrap().id, ids[0]);
}

#[tokio::test]
async fn requeue_clears_the_moderation_decision() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    let proposition = submit(&engine, &session, "abc123").await.unwrap();

    let approved = engine
        .propositions
        .moderate(proposition.id, MODERATOR, ModerationAction::Approve)
        .await
        .unwrap();
    assert_eq!(approved.moderator_id.as_deref(), Some(MODERATOR));
    assert!(approved.moderated_at.is_some());

    let requeued = engine
        .propositions
        .moderate(proposition.id, MODERATOR, ModerationAction::Requeue)
        .await
        .unwrap();

    assert_eq!(requeued.status, PropositionStatus::Pending);
    assert_eq!(requeued.moderator_id, None);
    assert_eq!(requeued.moderated_at, None);
    assert_eq!(requeued.queue_position, None);
}

#[tokio::test]
async fn shuffle_produces_independent_permutations() {
    let (engine, session) = setup(false, QueueMode::Random).await;

    for track_id in ["t1", "t2", "t3", "t4", "t5"] {
        let proposition = submit(&engine, &session, track_id).await.unwrap();
        engine
            .propositions
            .moderate(proposition.id, OWNER, ModerationAction::Approve)
            .await
            .unwrap();
    }

    let mut orderings = HashSet::new();

    for _ in 0..10 {
        let count = engine.sessions.shuffle(session.id, OWNER).await.unwrap();
        assert_eq!(count, 5);

        let queue = engine.propositions.queue(session.id).await.unwrap();
        assert_eq!(positions(&queue), vec![1, 2, 3, 4, 5]);

        orderings.insert(queue.iter().map(|p| p.id).collect::<Vec<_>>());
    }

    // Ten independent permutations of five items collide with probability
    // far below any flake threshold
    assert!(orderings.len() > 1);
}

#[tokio::test]
async fn switching_into_random_mode_reshuffles() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    for track_id in ["t1", "t2", "t3"] {
        let proposition = submit(&engine, &session, track_id).await.unwrap();
        engine
            .propositions
            .moderate(proposition.id, OWNER, ModerationAction::Approve)
            .await
            .unwrap();
    }

    engine
        .sessions
        .set_queue_mode(session.id, OWNER, QueueMode::Random)
        .await
        .unwrap();

    let queue = engine.propositions.queue(session.id).await.unwrap();
    assert_eq!(positions(&queue), vec![1, 2, 3]);
}

#[tokio::test]
async fn owner_moderates_even_when_the_registry_is_down() {
    let (engine, session) =
        setup_with(FailingRegistry, false, QueueMode::Chronological).await;

    let proposition = submit(&engine, &session, "abc123").await.unwrap();

    let approved = engine
        .propositions
        .moderate(proposition.id, OWNER, ModerationAction::Approve)
        .await
        .unwrap();
    assert_eq!(approved.status, PropositionStatus::Approved);

    // A would-be moderator degrades to denial instead of an error
    let second = submit(&engine, &session, "def456").await.unwrap();
    assert!(matches!(
        engine
            .propositions
            .moderate(second.id, MODERATOR, ModerationAction::Approve)
            .await
            .unwrap_err(),
        PropositionError::Authorization(AuthorizationError::NotOwnerOrModerator)
    ));
}

#[tokio::test]
async fn owner_only_transitions_refuse_moderators() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    let proposition = submit(&engine, &session, "abc123").await.unwrap();
    engine
        .propositions
        .moderate(proposition.id, MODERATOR, ModerationAction::Approve)
        .await
        .unwrap();

    // Moderators can neither promote nor pull an approved track
    assert!(matches!(
        engine
            .propositions
            .promote(proposition.id, MODERATOR)
            .await
            .unwrap_err(),
        PropositionError::Authorization(AuthorizationError::OwnerOnly)
    ));
    assert!(matches!(
        engine
            .propositions
            .moderate(proposition.id, MODERATOR, ModerationAction::Reject)
            .await
            .unwrap_err(),
        PropositionError::Authorization(AuthorizationError::OwnerOnly)
    ));

    // The owner can do both
    engine
        .propositions
        .moderate(proposition.id, OWNER, ModerationAction::Reject)
        .await
        .unwrap();
}

#[tokio::test]
async fn deletion_is_limited_to_owner_and_submitter() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    let proposition = submit(&engine, &session, "abc123").await.unwrap();

    assert!(matches!(
        engine
            .propositions
            .delete(proposition.id, "9999")
            .await
            .unwrap_err(),
        PropositionError::Authorization(AuthorizationError::NotOwnerOrSubmitter)
    ));

    // The submitter may withdraw their own proposition
    engine
        .propositions
        .delete(proposition.id, VIEWER)
        .await
        .unwrap();

    // And deletion is hard removal, the same track can be proposed again
    assert!(submit(&engine, &session, "abc123").await.is_ok());
}

#[tokio::test]
async fn deleting_an_approved_proposition_recomputes_the_queue() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    let mut ids = Vec::new();
    for track_id in ["t1", "t2", "t3"] {
        let proposition = submit(&engine, &session, track_id).await.unwrap();
        engine
            .propositions
            .moderate(proposition.id, OWNER, ModerationAction::Approve)
            .await
            .unwrap();
        ids.push(proposition.id);
    }

    engine.propositions.delete(ids[0], OWNER).await.unwrap();

    let queue = engine.propositions.queue(session.id).await.unwrap();
    assert_eq!(positions(&queue), vec![1, 2]);
}

#[tokio::test]
async fn promotion_emits_exactly_one_event() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;
    let events = engine.events();

    let proposition = submit(&engine, &session, "abc123").await.unwrap();
    engine
        .propositions
        .moderate(proposition.id, OWNER, ModerationAction::Approve)
        .await
        .unwrap();
    engine
        .propositions
        .promote(proposition.id, OWNER)
        .await
        .unwrap();

    let promotions: Vec<_> = events
        .try_iter()
        .filter(|e| matches!(e, EngineEvent::PropositionPromoted { .. }))
        .collect();

    assert_eq!(promotions.len(), 1);

    match &promotions[0] {
        EngineEvent::PropositionPromoted {
            session_id,
            proposition: promoted,
            ..
        } => {
            assert_eq!(*session_id, session.id);
            assert_eq!(promoted.id, proposition.id);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn events_are_not_queued_without_a_subscriber() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    // Submissions, moderation and recomputes before anyone listens
    for track_id in ["t1", "t2", "t3"] {
        let proposition = submit(&engine, &session, track_id).await.unwrap();
        engine
            .propositions
            .moderate(proposition.id, OWNER, ModerationAction::Approve)
            .await
            .unwrap();
    }

    // Attaching the subscriber finds nothing retained
    let events = engine.events();
    assert_eq!(events.len(), 0);

    // From here on events flow
    submit(&engine, &session, "t4").await.unwrap();
    assert!(events
        .try_iter()
        .any(|e| matches!(e, EngineEvent::PropositionSubmitted { .. })));
}

#[tokio::test]
async fn session_codes_are_claimed_case_insensitively() {
    let (engine, session) = setup(false, QueueMode::Chronological).await;

    let result = engine
        .sessions
        .create(NewSession {
            code: "LOBBY".to_string(),
            streamer_id: session.streamer_id,
            prevent_duplicates: false,
            queue_mode: QueueMode::Chronological,
            is_private: false,
            playlist_ref: None,
        })
        .await;

    assert!(result.is_err());

    let found = engine.sessions.session_by_code("LoBbY").await.unwrap();
    assert_eq!(found.id, session.id);
}
