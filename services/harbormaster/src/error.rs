//! Error types for the admin service

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::policy::PolicyError;
use crate::registry::{FleetError, InvalidRepositoryName, RepositoryName};

/// Result type for admin service operations
pub type HarbormasterResult<T> = Result<T, HarbormasterError>;

/// Error types for admin service operations
#[derive(Debug, thiserror::Error)]
pub enum HarbormasterError {
    /// The account identifier was empty or malformed
    #[error("invalid account: {0:?}")]
    InvalidAccount(String),

    /// The user identifier was empty or malformed
    #[error("invalid user: {0:?}")]
    InvalidUser(String),

    /// The repository name was empty or contained the owner/name separator
    #[error(transparent)]
    InvalidRepository(#[from] InvalidRepositoryName),

    /// The request did not carry a valid token
    #[error("unauthorized")]
    Unauthorized,

    /// Key-value store error
    #[error("store error: {0}")]
    Store(#[from] kvstore::StoreError),

    /// Registry control-plane error
    #[error("registry error: {0}")]
    Fleet(#[from] FleetError),

    /// Policy (de)serialization error
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// A fan-out aborted at the named repository.
    ///
    /// Repositories updated before this one are not rolled back; a retried
    /// call converges because the per-repository mutation is idempotent.
    #[error("policy update failed for repository {repository}: {source}")]
    FanOut {
        /// The first repository whose update failed
        repository: RepositoryName,
        /// The underlying error
        #[source]
        source: Box<HarbormasterError>,
    },
}

impl HarbormasterError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            HarbormasterError::InvalidAccount(_)
            | HarbormasterError::InvalidUser(_)
            | HarbormasterError::InvalidRepository(_) => StatusCode::BAD_REQUEST,
            HarbormasterError::Unauthorized => StatusCode::UNAUTHORIZED,
            HarbormasterError::Store(_) | HarbormasterError::Policy(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            HarbormasterError::Fleet(err) => match err {
                FleetError::RepositoryNotFound(_) | FleetError::ImageNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                FleetError::RepositoryExists(_) | FleetError::RepositoryNotEmpty(_) => {
                    StatusCode::CONFLICT
                }
                FleetError::Request { .. } => StatusCode::BAD_GATEWAY,
            },
            HarbormasterError::FanOut { source, .. } => source.status_code(),
        }
    }

    /// Get the machine-readable code for error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            HarbormasterError::InvalidAccount(_) => "ACCOUNT_INVALID",
            HarbormasterError::InvalidUser(_) => "USER_INVALID",
            HarbormasterError::InvalidRepository(_) => "NAME_INVALID",
            HarbormasterError::Unauthorized => "UNAUTHORIZED",
            HarbormasterError::Store(_) => "STORE_ERROR",
            HarbormasterError::Fleet(err) => match err {
                FleetError::RepositoryNotFound(_) => "REPOSITORY_UNKNOWN",
                FleetError::RepositoryExists(_) => "REPOSITORY_EXISTS",
                FleetError::RepositoryNotEmpty(_) => "REPOSITORY_NOT_EMPTY",
                FleetError::ImageNotFound(_) => "IMAGE_UNKNOWN",
                FleetError::Request { .. } => "REGISTRY_ERROR",
            },
            HarbormasterError::Policy(_) => "POLICY_INVALID",
            HarbormasterError::FanOut { source, .. } => source.error_code(),
        }
    }
}

/// Error response format
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, serde::Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for HarbormasterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        let body = ErrorResponse {
            errors: vec![ErrorDetail { code, message }],
        };

        (status, axum::Json(body)).into_response()
    }
}
