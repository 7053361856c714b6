use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use requestify_engine::{
    AuthorizationError, DatabaseError, EligibilityError, PropositionError, SessionError,
    StateError,
};

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    /// Authorization failures collapse into this, so responses never leak
    /// who is or isn't on the moderator list
    #[error("Access denied")]
    AccessDenied,
    /// Eligibility refusals are safe to show the submitting viewer verbatim
    #[error("{0}")]
    Refused(String),
    /// State errors indicate client desynchronization and surface verbatim
    #[error("{0}")]
    Precondition(StateError),
    #[error("{0}")]
    BadRequest(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound {
                resource: _,
                identifier: _,
            } => StatusCode::NOT_FOUND,
            Self::Conflict {
                resource: _,
                field: _,
                value: _,
            } => StatusCode::CONFLICT,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::Refused(_) => StatusCode::CONFLICT,
            Self::Precondition(StateError::NotFound) => StatusCode::NOT_FOUND,
            Self::Precondition(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<PropositionError> for ServerError {
    fn from(value: PropositionError) -> Self {
        match value {
            PropositionError::Eligibility(EligibilityError::Db(e)) => Self::from(e),
            PropositionError::Eligibility(e) => Self::Refused(e.to_string()),
            PropositionError::Authorization(_) => Self::AccessDenied,
            PropositionError::State(e) => Self::Precondition(e),
            PropositionError::Db(e) => Self::from(e),
        }
    }
}

impl From<SessionError> for ServerError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::InvalidCode => Self::BadRequest(value.to_string()),
            SessionError::Authorization(AuthorizationError::NotOwnerOrModerator)
            | SessionError::Authorization(AuthorizationError::OwnerOnly)
            | SessionError::Authorization(AuthorizationError::NotOwnerOrSubmitter) => {
                Self::AccessDenied
            }
            SessionError::Db(e) => Self::from(e),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}
