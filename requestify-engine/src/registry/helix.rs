use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::{ModeratorRegistry, RegistryError};

pub const DEFAULT_API_BASE: &str = "https://api.twitch.tv/helix";

/// The moderator list is fetched over network I/O that callers must not hang
/// on, so every request is bounded by this timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Page size for the moderator listing endpoint.
const PAGE_SIZE: usize = 100;

/// A Helix-style moderator registry client.
pub struct HelixRegistry {
    client: Client,
    api_base: String,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct ModeratorPage {
    data: Vec<Moderator>,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct Moderator {
    user_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    cursor: Option<String>,
}

impl HelixRegistry {
    pub fn new(api_base: &str, client_id: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("http client is built");

        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
        }
    }

    async fn fetch_page(
        &self,
        broadcaster_id: &str,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<ModeratorPage, RegistryError> {
        let page_size = PAGE_SIZE.to_string();

        let mut request = self
            .client
            .get(format!("{}/moderation/moderators", self.api_base))
            .bearer_auth(access_token)
            .header("Client-Id", &self.client_id)
            .query(&[
                ("broadcaster_id", broadcaster_id),
                ("first", page_size.as_str()),
            ]);

        if let Some(cursor) = cursor {
            request = request.query(&[("after", cursor)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(RegistryError::Unauthenticated),
            StatusCode::FORBIDDEN => return Err(RegistryError::Forbidden),
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                return Err(RegistryError::BadRequest(body));
            }
            status if !status.is_success() => {
                return Err(RegistryError::Unavailable(format!(
                    "unexpected status {status}"
                )))
            }
            _ => {}
        }

        response
            .json()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl ModeratorRegistry for HelixRegistry {
    async fn list_moderators(
        &self,
        broadcaster_id: &str,
        access_token: &str,
    ) -> Result<Vec<String>, RegistryError> {
        let mut moderators = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .fetch_page(broadcaster_id, access_token, cursor.as_deref())
                .await?;

            let page_len = page.data.len();
            moderators.extend(page.data.into_iter().map(|m| m.user_id));

            match page.pagination.cursor {
                Some(next) if page_len == PAGE_SIZE => cursor = Some(next),
                _ => break,
            }
        }

        Ok(moderators)
    }
}
