use async_trait::async_trait;
use thiserror::Error;

mod helix;
pub use helix::*;

/// Errors the external moderator registry can fail with.
///
/// None of these are ever fatal to a moderation request. The authority
/// resolver degrades them all to "not authorized" and logs the cause, so
/// operators can tell an expired token apart from an outage.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The owner's token was rejected, usually because it expired
    #[error("Registry rejected the owner token")]
    Unauthenticated,

    /// The token is valid but lacks the scope to read the moderator list
    #[error("Registry denied access to the moderator list")]
    Forbidden,

    /// The registry rejected the request itself
    #[error("Registry rejected the request: {0}")]
    BadRequest(String),

    /// The registry could not be reached or returned an unexpected response
    #[error("Registry is unavailable: {0}")]
    Unavailable(String),
}

/// The external, streamer-owned list of users entitled to moderate that
/// streamer's sessions, queried with the owner's own token.
#[async_trait]
pub trait ModeratorRegistry: Send + Sync + 'static {
    /// Returns the external identities of every moderator of the broadcaster.
    async fn list_moderators(
        &self,
        broadcaster_id: &str,
        access_token: &str,
    ) -> Result<Vec<String>, RegistryError>;
}
