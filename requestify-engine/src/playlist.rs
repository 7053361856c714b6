use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaylistError {
    /// The playlist provider refused the track
    #[error("Playlist provider rejected the track: {0}")]
    Rejected(String),

    /// The playlist provider could not be reached
    #[error("Playlist provider is unavailable: {0}")]
    Unavailable(String),
}

/// An opaque "add track to playlist" effect.
///
/// The engine never calls this itself. It emits
/// [crate::EngineEvent::PropositionPromoted] exactly once per promotion and
/// leaves the forwarding to the caller, so a promotion is never coupled to
/// the provider being reachable.
#[async_trait]
pub trait PlaylistSink: Send + Sync + 'static {
    async fn add_track(&self, playlist_ref: &str, track_ref: &str) -> Result<(), PlaylistError>;
}

/// A playlist sink posting to a web playlist provider.
pub struct WebPlaylistSink {
    client: Client,
    api_base: String,
    access_token: String,
}

impl WebPlaylistSink {
    pub fn new(api_base: &str, access_token: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("http client is built");

        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }
}

#[async_trait]
impl PlaylistSink for WebPlaylistSink {
    async fn add_track(&self, playlist_ref: &str, track_ref: &str) -> Result<(), PlaylistError> {
        let response = self
            .client
            .post(format!(
                "{}/playlists/{}/tracks",
                self.api_base, playlist_ref
            ))
            .bearer_auth(&self.access_token)
            .json(&json!({ "uris": [track_ref] }))
            .send()
            .await
            .map_err(|e| PlaylistError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => Err(
                PlaylistError::Unavailable(format!("status {}", response.status())),
            ),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(PlaylistError::Rejected(format!("{status}: {body}")))
            }
        }
    }
}
