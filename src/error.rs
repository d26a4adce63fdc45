//! Errors raised while handling a connection.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use http_types::StatusCode;
use serde::Serialize;

use crate::token::TokenError;

/// A specialized `Result` for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors when handling incoming requests.
///
/// Every variant maps to the HTTP status it is reported as; see
/// [`Error::status`]. The transport-side variants (`HeadTooLarge`,
/// `RequestTooLarge`, `Timeout`, `Io`) are never rendered: the connection is
/// aborted instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request line or head could not be parsed.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// No handler chain is registered for the path.
    #[error("no route registered for {0}")]
    RouteNotFound(String),

    /// A middleware or handler reported a failure.
    #[error("middleware failure: {0}")]
    MiddlewareFailure(String),

    /// The auth gate ran before any auth configuration was set.
    #[error("auth is not configured")]
    AuthNotConfigured,

    /// Auth configuration can only be set once.
    #[error("auth is already configured")]
    AuthAlreadyConfigured,

    /// The auth cookie is absent from the request.
    #[error("no token")]
    AuthMissingToken,

    /// The auth cookie failed verification.
    #[error("invalid token: {0}")]
    AuthInvalidToken(#[source] TokenError),

    /// Signing a token failed.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// A static file could not be read.
    #[error("file unavailable: {}: {source}", .path.display())]
    FileUnavailable {
        /// The path that was requested.
        path: PathBuf,
        /// The underlying read error.
        #[source]
        source: io::Error,
    },

    /// The response was already finalized.
    #[error("response already sent")]
    AlreadySent,

    /// A header or cookie would not render as a single header line.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The request head exceeded the configured limit.
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    /// The buffered request exceeded the configured limit.
    #[error("request exceeds {0} bytes")]
    RequestTooLarge(usize),

    /// The client did not deliver a full request in time.
    #[error("timed out after {0:?} waiting for the request")]
    Timeout(Duration),

    /// A value could not be serialized to, or parsed from, JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A transport or storage level I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The JSON body rendered for error responses.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl Error {
    /// Create a [`Error::MiddlewareFailure`] from any message.
    pub fn middleware(msg: impl Into<String>) -> Self {
        Error::MiddlewareFailure(msg.into())
    }

    /// The HTTP status this error is reported as.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::MalformedRequest(_) => StatusCode::BadRequest,
            Error::RouteNotFound(_) => StatusCode::NotFound,
            Error::AuthNotConfigured | Error::AuthMissingToken | Error::AuthInvalidToken(_) => {
                StatusCode::Unauthorized
            }
            Error::FileUnavailable { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                StatusCode::NotFound
            }
            Error::HeadTooLarge(_) => StatusCode::RequestHeaderFieldsTooLarge,
            Error::RequestTooLarge(_) => StatusCode::PayloadTooLarge,
            Error::Timeout(_) => StatusCode::RequestTimeout,
            _ => StatusCode::InternalServerError,
        }
    }

    /// Whether the connection should be dropped without a response.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::HeadTooLarge(_) | Error::RequestTooLarge(_) | Error::Timeout(_) | Error::Io(_)
        )
    }

    /// The JSON body for this error, or `None` when the body is empty.
    pub(crate) fn body(&self) -> Option<ErrorBody> {
        let (error, detail) = match self {
            Error::RouteNotFound(_) => return None,
            Error::AuthNotConfigured => ("Unauthorized: auth not configured", None),
            Error::AuthMissingToken => ("Unauthorized: no token", None),
            Error::AuthInvalidToken(e) => ("Unauthorized", Some(e.to_string())),
            Error::MalformedRequest(msg) => ("Bad Request", Some(msg.clone())),
            Error::MiddlewareFailure(msg) => ("Internal Server Error", Some(msg.clone())),
            other => (other.status().canonical_reason(), Some(other.to_string())),
        };
        Some(ErrorBody {
            error: error.to_owned(),
            detail,
        })
    }
}
