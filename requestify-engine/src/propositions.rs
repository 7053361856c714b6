use chrono::Utc;
use log::{error, info};
use thiserror::Error;

use crate::{
    check_eligible, same_identity, AuthorizationError, Database, DatabaseError, EligibilityError,
    EngineContext, EngineEvent, ModeratorRegistry, NewProposition, PrimaryKey, PropositionData,
    PropositionStatus, SessionData, TrackMetadata, TrackRef,
};

/// A precondition of a lifecycle transition was violated. These indicate
/// client desynchronization, not system failure, and are surfaced verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Proposition doesn't exist")]
    NotFound,
    #[error("Proposition was already moderated")]
    AlreadyModerated,
    #[error("Proposition is already pending")]
    AlreadyPending,
    #[error("Proposition was already added")]
    AlreadyAdded,
    #[error("Proposition is not approved")]
    NotApproved,
    #[error("Proposition doesn't belong to this session")]
    SessionMismatch,
    #[error("Session is not active")]
    SessionInactive,
}

#[derive(Debug, Error)]
pub enum PropositionError {
    #[error(transparent)]
    Eligibility(#[from] EligibilityError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    State(#[from] StateError),
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

/// A moderation decision on a pending or previously moderated proposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Approve,
    Reject,
    /// Returns an approved or rejected proposition to pending, clearing the
    /// earlier decision.
    Requeue,
}

/// A viewer's request to nominate a track.
#[derive(Debug)]
pub struct NewSubmission {
    pub session_id: PrimaryKey,
    pub viewer_id: String,
    /// Raw track reference as the viewer supplied it. Normalized before any
    /// duplicate comparison.
    pub track_ref: String,
    pub metadata: TrackMetadata,
    pub message: Option<String>,
}

/// Owns the lifecycle of propositions: creation, moderation, promotion and
/// deletion, together with the queue recomputes those transitions trigger.
pub struct PropositionManager<Db, R> {
    context: EngineContext<Db, R>,
}

impl<Db, R> PropositionManager<Db, R>
where
    Db: Database,
    R: ModeratorRegistry,
{
    pub fn new(context: &EngineContext<Db, R>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a new pending proposition if the session is active and the
    /// track passes the eligibility check.
    pub async fn submit(
        &self,
        submission: NewSubmission,
    ) -> Result<PropositionData, PropositionError> {
        let session = self.session(submission.session_id).await?;

        if !session.active {
            return Err(StateError::SessionInactive.into());
        }

        let track_ref = TrackRef::normalize(&submission.track_ref);

        check_eligible(self.context.db.as_ref(), &session, &track_ref).await?;

        let proposition = self
            .context
            .db
            .create_proposition(NewProposition {
                session_id: session.id,
                submitter_id: submission.viewer_id,
                track_ref: track_ref.into_string(),
                metadata: submission.metadata,
                message: submission.message,
            })
            .await
            .map_err(|e| {
                // The pre-check raced with a concurrent submission and the
                // storage constraint caught it
                if e.is_conflict() {
                    PropositionError::Eligibility(EligibilityError::DuplicateInSession)
                } else {
                    PropositionError::Db(e)
                }
            })?;

        info!(
            "Viewer {} proposed {} in session {}",
            proposition.submitter_id, proposition.track_name, session.code
        );

        self.context.emit(EngineEvent::PropositionSubmitted {
            session_id: session.id,
            proposition_id: proposition.id,
        });

        Ok(proposition)
    }

    /// Applies a moderation decision on behalf of the actor.
    pub async fn moderate(
        &self,
        proposition_id: PrimaryKey,
        actor_id: &str,
        action: ModerationAction,
    ) -> Result<PropositionData, PropositionError> {
        let proposition = self.proposition(proposition_id).await?;
        let session = self.session(proposition.session_id).await?;

        let updated = match action {
            ModerationAction::Approve => {
                match proposition.status {
                    PropositionStatus::Pending => {}
                    PropositionStatus::Added => return Err(StateError::AlreadyAdded.into()),
                    _ => return Err(StateError::AlreadyModerated.into()),
                }

                self.ensure_moderator(actor_id, &session).await?;

                let result = self
                    .context
                    .db
                    .set_proposition_moderation(
                        proposition.id,
                        PropositionStatus::Pending,
                        PropositionStatus::Approved,
                        actor_id,
                        Utc::now(),
                    )
                    .await;
                self.applied(proposition.id, result).await?;

                self.recompute(&session).await?;

                // Re-read to pick up the queue position the recompute assigned
                self.proposition(proposition.id).await?
            }
            ModerationAction::Reject => {
                match proposition.status {
                    // A pending proposition can be rejected by any moderator,
                    // pulling one out of the queue is reserved for the owner
                    PropositionStatus::Pending => {
                        self.ensure_moderator(actor_id, &session).await?
                    }
                    PropositionStatus::Approved => self.ensure_owner(actor_id, &session).await?,
                    PropositionStatus::Added => return Err(StateError::AlreadyAdded.into()),
                    PropositionStatus::Rejected => {
                        return Err(StateError::AlreadyModerated.into())
                    }
                }

                let result = self
                    .context
                    .db
                    .set_proposition_moderation(
                        proposition.id,
                        proposition.status,
                        PropositionStatus::Rejected,
                        actor_id,
                        Utc::now(),
                    )
                    .await;
                let updated = self.applied(proposition.id, result).await?;

                if proposition.status == PropositionStatus::Approved {
                    self.recompute(&session).await?;
                }

                updated
            }
            ModerationAction::Requeue => {
                match proposition.status {
                    PropositionStatus::Approved | PropositionStatus::Rejected => {}
                    PropositionStatus::Pending => return Err(StateError::AlreadyPending.into()),
                    PropositionStatus::Added => return Err(StateError::AlreadyAdded.into()),
                }

                self.ensure_moderator(actor_id, &session).await?;

                let result = self
                    .context
                    .db
                    .clear_proposition_moderation(proposition.id)
                    .await;
                let updated = self.applied(proposition.id, result).await?;

                if proposition.status == PropositionStatus::Approved {
                    self.recompute(&session).await?;
                }

                updated
            }
        };

        info!(
            "Moderator {} applied {:?} to proposition {} in session {}",
            actor_id, action, proposition.id, session.code
        );

        self.context.emit(EngineEvent::PropositionModerated {
            session_id: session.id,
            proposition_id: updated.id,
            new_status: updated.status,
        });

        Ok(updated)
    }

    /// Promotes an approved proposition to `added`, recording it in the
    /// streamer's history. Owner only.
    ///
    /// If history recording fails the status transition is not rolled back;
    /// the storage error surfaces and the promotion event is withheld so the
    /// caller never forwards an unrecorded track.
    pub async fn promote(
        &self,
        proposition_id: PrimaryKey,
        actor_id: &str,
    ) -> Result<PropositionData, PropositionError> {
        let proposition = self.proposition(proposition_id).await?;
        let session = self.session(proposition.session_id).await?;

        self.ensure_owner(actor_id, &session).await?;

        match proposition.status {
            PropositionStatus::Approved => {}
            PropositionStatus::Added => return Err(StateError::AlreadyAdded.into()),
            _ => return Err(StateError::NotApproved.into()),
        }

        let result = self
            .context
            .db
            .set_proposition_added(proposition.id, Utc::now())
            .await;
        let updated = self.applied(proposition.id, result).await?;

        let track_ref = TrackRef::normalize(&updated.track_ref);

        if let Err(e) = self
            .context
            .history
            .record(session.streamer_id, &track_ref, updated.metadata())
            .await
        {
            error!(
                "Proposition {} was promoted but history recording failed: {}",
                updated.id, e
            );
            return Err(PropositionError::Db(e));
        }

        self.recompute(&session).await?;

        info!(
            "Owner promoted {} to the playlist in session {}",
            updated.track_name, session.code
        );

        self.context.emit(EngineEvent::PropositionPromoted {
            session_id: session.id,
            streamer_id: session.streamer_id,
            proposition: updated.clone(),
        });

        Ok(updated)
    }

    /// Hard-deletes a proposition. Allowed to the session owner and the
    /// original submitter, from any state.
    pub async fn delete(
        &self,
        proposition_id: PrimaryKey,
        actor_id: &str,
    ) -> Result<(), PropositionError> {
        let proposition = self.proposition(proposition_id).await?;
        let session = self.session(proposition.session_id).await?;

        let owner = self
            .context
            .db
            .streamer_by_id(session.streamer_id)
            .await
            .map_err(PropositionError::Db)?;

        let is_owner = same_identity(actor_id, &owner.external_id);
        let is_submitter = same_identity(actor_id, &proposition.submitter_id);

        if !is_owner && !is_submitter {
            return Err(AuthorizationError::NotOwnerOrSubmitter.into());
        }

        self.context
            .db
            .delete_proposition(proposition.id)
            .await
            .map_err(PropositionError::Db)?;

        if proposition.status == PropositionStatus::Approved {
            self.recompute(&session).await?;
        }

        info!(
            "Proposition {} deleted from session {} by {}",
            proposition.id, session.code, actor_id
        );

        self.context.emit(EngineEvent::PropositionDeleted {
            session_id: session.id,
            proposition_id: proposition.id,
        });

        Ok(())
    }

    /// All propositions of a session, in submission order.
    pub async fn list(
        &self,
        session_id: PrimaryKey,
    ) -> Result<Vec<PropositionData>, DatabaseError> {
        self.context.db.propositions_by_session(session_id).await
    }

    /// The approved propositions of a session, in queue order.
    pub async fn queue(
        &self,
        session_id: PrimaryKey,
    ) -> Result<Vec<PropositionData>, DatabaseError> {
        let mut approved = self.context.db.approved_propositions(session_id).await?;
        approved.sort_by_key(|p| p.queue_position);

        Ok(approved)
    }

    /// Fetches a proposition and checks it belongs to the given session.
    /// Used by callers whose requests are scoped to a session.
    pub async fn proposition_in_session(
        &self,
        session_id: PrimaryKey,
        proposition_id: PrimaryKey,
    ) -> Result<PropositionData, PropositionError> {
        let proposition = self.proposition(proposition_id).await?;

        if proposition.session_id != session_id {
            return Err(StateError::SessionMismatch.into());
        }

        Ok(proposition)
    }

    /// Resolves a conditional status write. The store reports a conflict
    /// when the status moved on between our read and the write; re-read to
    /// report the state the proposition is actually in now.
    async fn applied(
        &self,
        proposition_id: PrimaryKey,
        result: Result<PropositionData, DatabaseError>,
    ) -> Result<PropositionData, PropositionError> {
        match result {
            Ok(updated) => Ok(updated),
            Err(e) if e.is_conflict() => {
                let current = self.proposition(proposition_id).await?;

                Err(match current.status {
                    PropositionStatus::Pending => StateError::AlreadyPending.into(),
                    PropositionStatus::Added => StateError::AlreadyAdded.into(),
                    PropositionStatus::Approved | PropositionStatus::Rejected => {
                        StateError::AlreadyModerated.into()
                    }
                })
            }
            Err(e) => Err(PropositionError::Db(e)),
        }
    }

    async fn proposition(
        &self,
        proposition_id: PrimaryKey,
    ) -> Result<PropositionData, PropositionError> {
        self.context
            .db
            .proposition_by_id(proposition_id)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    StateError::NotFound.into()
                } else {
                    PropositionError::Db(e)
                }
            })
    }

    async fn session(&self, session_id: PrimaryKey) -> Result<SessionData, PropositionError> {
        self.context
            .db
            .session_by_id(session_id)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    StateError::NotFound.into()
                } else {
                    PropositionError::Db(e)
                }
            })
    }

    async fn ensure_moderator(
        &self,
        actor_id: &str,
        session: &SessionData,
    ) -> Result<(), PropositionError> {
        let authorized = self
            .context
            .resolver
            .is_authorized(actor_id, session)
            .await
            .map_err(PropositionError::Db)?;

        if authorized {
            Ok(())
        } else {
            Err(AuthorizationError::NotOwnerOrModerator.into())
        }
    }

    async fn ensure_owner(
        &self,
        actor_id: &str,
        session: &SessionData,
    ) -> Result<(), PropositionError> {
        let owner = self
            .context
            .db
            .streamer_by_id(session.streamer_id)
            .await
            .map_err(PropositionError::Db)?;

        if same_identity(actor_id, &owner.external_id) {
            Ok(())
        } else {
            Err(AuthorizationError::OwnerOnly.into())
        }
    }

    async fn recompute(&self, session: &SessionData) -> Result<(), PropositionError> {
        let count = self
            .context
            .allocator
            .recompute(self.context.db.as_ref(), session.id, session.queue_mode)
            .await
            .map_err(PropositionError::Db)?;

        self.context.emit(EngineEvent::QueueRecomputed {
            session_id: session.id,
            count,
        });

        Ok(())
    }
}
