use axum::http::StatusCode;
use thiserror::Error;

/// AccessError
///
/// The failure taxonomy of a single access evaluation. Every variant is
/// recoverable at the router boundary: the router logs it and degrades to the
/// fail-closed decision instead of propagating it to the transport layer.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("session resolution failed: {0}")]
    SessionResolution(#[from] SessionError),

    #[error("membership lookup failed: {0}")]
    MembershipLookup(#[from] LookupError),

    #[error("malformed request path: {0}")]
    MalformedRequestPath(String),
}

/// SessionError
///
/// Raised by a `SessionProvider` when the credential material could not be
/// turned into a definite answer (session or no session).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session resolution timed out")]
    Timeout,

    #[error("auth cookie could not be decoded: {0}")]
    MalformedCookie(String),

    #[error("token refresh request failed: {0}")]
    Refresh(#[from] reqwest::Error),

    #[error("token refresh returned {0}")]
    RefreshStatus(StatusCode),
}

/// LookupError
///
/// Raised by a `MembershipStore` when the directory could not be queried.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("membership lookup timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
