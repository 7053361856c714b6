mod db;
mod eligibility;
mod events;
mod history;
mod moderation;
mod playlist;
mod propositions;
mod queue;
mod registry;
mod sessions;
mod track;

use crossbeam::channel::unbounded;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

pub use db::*;
pub use eligibility::*;
pub use events::*;
pub use history::*;
pub use moderation::*;
pub use playlist::*;
pub use propositions::*;
pub use queue::*;
pub use registry::*;
pub use sessions::*;
pub use track::*;

/// The requestify engine, owning the proposition lifecycle and queue for
/// every session.
///
/// The database is the single source of truth; the engine holds no
/// authoritative queue state in memory. The only in-process shared state is
/// the moderator verdict cache and the per-session recompute locks.
pub struct Engine<Db, R> {
    context: EngineContext<Db, R>,
    events: EventReceiver,

    pub sessions: SessionManager<Db, R>,
    pub propositions: PropositionManager<Db, R>,
}

/// A type passed to the managers of the engine, to access state, emit events,
/// and resolve moderation authority.
pub struct EngineContext<Db, R> {
    pub db: Arc<Db>,
    pub resolver: Arc<ModeratorResolver<Db, R>>,
    pub allocator: Arc<QueueAllocator>,
    pub history: Arc<HistoryRecorder<Db>>,

    events: EventSender,
    subscribed: Arc<AtomicBool>,
}

impl<Db, R> Engine<Db, R>
where
    Db: Database,
    R: ModeratorRegistry,
{
    pub fn new(database: Db, registry: R) -> Self {
        let database = Arc::new(database);
        let registry = Arc::new(registry);

        let (event_sender, event_receiver) = unbounded();

        let context = EngineContext {
            resolver: Arc::new(ModeratorResolver::new(&database, &registry)),
            allocator: Arc::new(QueueAllocator::new()),
            history: Arc::new(HistoryRecorder::new(&database)),
            db: database,

            events: event_sender,
            subscribed: Arc::new(AtomicBool::new(false)),
        };

        let sessions = SessionManager::new(&context);
        let propositions = PropositionManager::new(&context);

        Self {
            sessions,
            propositions,
            events: event_receiver,
            context,
        }
    }

    /// Returns a receiver of engine events. Promotions surface here exactly
    /// once, so a caller can forward them to a playlist sink.
    ///
    /// Events emitted before the first subscriber attaches are dropped
    /// rather than queued, so an engine nobody listens to does not
    /// accumulate them.
    pub fn events(&self) -> EventReceiver {
        self.context.subscribed.store(true, Ordering::Relaxed);
        self.events.clone()
    }
}

impl<Db, R> EngineContext<Db, R>
where
    Db: Database,
    R: ModeratorRegistry,
{
    pub fn emit(&self, event: EngineEvent) {
        if self.subscribed.load(Ordering::Relaxed) {
            self.events.send(event).ok();
        }
    }
}

impl<Db, R> Clone for EngineContext<Db, R>
where
    Db: Database,
    R: ModeratorRegistry,
{
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            resolver: self.resolver.clone(),
            allocator: self.allocator.clone(),
            history: self.history.clone(),
            events: self.events.clone(),
            subscribed: self.subscribed.clone(),
        }
    }
}
