//! Request-level error types.
//!
//! Every variant maps to a machine-readable error code carried in the
//! `x-error-code` response header, alongside a human-readable detail in
//! `x-error-message`.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(ObsError::ResourceNotFound(..))`.
//!
//! Fatal configuration errors (unknown backend, duplicate backend name,
//! unusable startup credentials) are not represented here: they are
//! `anyhow` errors surfaced from `main` before the server accepts traffic.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Response header carrying the machine-readable error code.
pub const ERROR_CODE_HEADER: &str = "x-error-code";

/// Response header carrying the human-readable error detail.
pub const ERROR_MESSAGE_HEADER: &str = "x-error-message";

/// Errors a backend handler can produce for a single request.
#[derive(Debug, Error)]
pub enum ObsError {
    /// The request used a method other than GET or HEAD.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// The object does not exist, or the existence check failed.
    ///
    /// The two cases are deliberately conflated at the HTTP layer so that
    /// anonymous callers cannot distinguish backend outages from absent
    /// objects; the underlying cause is logged in full.
    #[error("resource not found: {0}")]
    ResourceNotFound(#[source] anyhow::Error),

    /// Composing the presign-eligible request for the object failed.
    #[error("compose presign request: {0}")]
    ComposeRequest(#[source] anyhow::Error),

    /// The storage client's credentials provider failed or is absent.
    #[error("resolve signing credentials: {0}")]
    CredsProvider(#[source] anyhow::Error),

    /// Composing the public share URL failed.
    #[error("compose share url: {0}")]
    ComposeShareUrl(#[source] anyhow::Error),
}

impl ObsError {
    /// Return the machine-readable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            ObsError::MethodNotAllowed => "OBS_METHOD_NOT_ALLOWED",
            ObsError::ResourceNotFound(_) => "OBS_RESOURCE_NOT_FOUND",
            ObsError::ComposeRequest(_) => "S3_COMPOSE_REQUEST",
            ObsError::CredsProvider(_) => "S3_CREDS_PROVIDER",
            ObsError::ComposeShareUrl(_) => "STORJ_COMPOSE_SHARE_URL",
        }
    }

    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ObsError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ObsError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            ObsError::ComposeRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ObsError::CredsProvider(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ObsError::ComposeShareUrl(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ObsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Header values must stay on one line; collapse any newlines the
        // underlying cause may carry.
        let message = self.to_string().replace(['\r', '\n'], " ");

        (
            status,
            [
                (ERROR_CODE_HEADER, self.code().to_string()),
                (ERROR_MESSAGE_HEADER, message),
            ],
        )
            .into_response()
    }
}

// -- Tests -------------------------------------------------------------------
