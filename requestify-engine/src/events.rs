use crossbeam::channel::{Receiver, Sender};

use crate::{PrimaryKey, PropositionData, PropositionStatus};

pub type EventSender = Sender<EngineEvent>;
pub type EventReceiver = Receiver<EngineEvent>;

/// Events emitted by the engine as propositions move through their lifecycle.
#[derive(Debug)]
pub enum EngineEvent {
    /// A viewer's submission passed the eligibility check and was created.
    PropositionSubmitted {
        session_id: PrimaryKey,
        proposition_id: PrimaryKey,
    },
    /// A moderation decision was applied.
    PropositionModerated {
        session_id: PrimaryKey,
        proposition_id: PrimaryKey,
        new_status: PropositionStatus,
    },
    /// A proposition reached `added`. Emitted exactly once per promotion, so
    /// a caller can forward the track to a playlist without double-adding.
    PropositionPromoted {
        session_id: PrimaryKey,
        streamer_id: PrimaryKey,
        proposition: PropositionData,
    },
    /// A proposition was removed by the owner or its submitter.
    PropositionDeleted {
        session_id: PrimaryKey,
        proposition_id: PrimaryKey,
    },
    /// Queue positions of a session were reassigned.
    QueueRecomputed {
        session_id: PrimaryKey,
        count: usize,
    },
}
