use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts, StatusCode},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use validator::Validate;

use requestify_engine::QueueMode;

use crate::ServerContext;

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterStreamerSchema {
    #[validate(length(min = 1, max = 64))]
    pub external_id: String,
    #[validate(length(min = 1, max = 128))]
    pub display_name: String,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StreamerTokenSchema {
    /// Omitting the token clears it
    #[validate(length(max = 512))]
    pub access_token: Option<String>,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewSessionSchema {
    #[validate(length(min = 3, max = 32))]
    pub code: String,
    #[serde(default)]
    pub prevent_duplicates: bool,
    #[serde(default)]
    pub is_private: bool,
    pub queue_mode: Option<QueueMode>,
    #[validate(length(max = 128))]
    pub playlist_ref: Option<String>,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueueModeSchema {
    pub mode: QueueMode,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActiveSchema {
    pub active: bool,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewPropositionSchema {
    #[validate(length(min = 1, max = 512))]
    pub track_ref: String,
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(length(max = 256))]
    pub artist: String,
    #[validate(length(max = 256))]
    pub album: Option<String>,
    /// Duration in seconds
    pub duration: f32,
    #[validate(length(max = 255))]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModerationActionSchema {
    Approve,
    Reject,
    Requeue,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModerateSchema {
    pub action: ModerationActionSchema,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}

/// The external identity the request acts as.
///
/// The OAuth exchange proving this identity lives outside the core; here it
/// arrives as a bearer-style header the fronting proxy has already verified.
pub struct Identity(pub String);

#[async_trait]
impl FromRequestParts<ServerContext> for Identity {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|x| x.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing authorization"))?;

        let parts: Vec<_> = header.split_ascii_whitespace().collect();

        match parts.as_slice() {
            ["Bearer", identity] if !identity.is_empty() => Ok(Self(identity.to_string())),
            ["Bearer"] => Err((StatusCode::UNAUTHORIZED, "Missing identity")),
            _ => Err((StatusCode::BAD_REQUEST, "Authorization must be Bearer")),
        }
    }
}
