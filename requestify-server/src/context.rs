use std::sync::Arc;

use axum::extract::FromRef;
use requestify_engine::{Engine, HelixRegistry, PgDatabase, WebPlaylistSink};

/// The engine as the server runs it.
pub type ServerEngine = Engine<PgDatabase, HelixRegistry>;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub engine: Arc<ServerEngine>,
    /// Where promoted tracks are forwarded, if a playlist is configured.
    pub playlist: Option<Arc<WebPlaylistSink>>,
}
