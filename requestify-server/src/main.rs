use std::{env, sync::Arc};

use requestify_engine::{Engine, HelixRegistry, PgDatabase, WebPlaylistSink, DEFAULT_API_BASE};
use requestify_server::{check_events, init_logger, run_server, ServerContext};

#[tokio::main]
async fn main() {
    init_logger();

    let database_url =
        env::var("REQUESTIFY_DATABASE_URL").expect("REQUESTIFY_DATABASE_URL is set");
    let client_id = env::var("REQUESTIFY_CLIENT_ID").expect("REQUESTIFY_CLIENT_ID is set");
    let registry_url =
        env::var("REQUESTIFY_REGISTRY_URL").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

    let database = PgDatabase::new(&database_url)
        .await
        .expect("database connects and migrates");
    let registry = HelixRegistry::new(&registry_url, &client_id);

    let playlist = match (
        env::var("REQUESTIFY_PLAYLIST_API"),
        env::var("REQUESTIFY_PLAYLIST_TOKEN"),
    ) {
        (Ok(api_base), Ok(token)) => Some(Arc::new(WebPlaylistSink::new(&api_base, &token))),
        _ => None,
    };

    let engine = Arc::new(Engine::new(database, registry));
    let context = ServerContext { engine, playlist };

    tokio::spawn(check_events(context.clone()));

    run_server(context).await
}
