//! Error taxonomy shared by every public operation of the SDK.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the SDK.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed asset, vault or chain identifier. Inputs are never coerced.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Nonce fetch or token exchange failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// No response carrying `key` arrived before the deadline.
    #[error("no response for {key} within {timeout:?}")]
    CorrelationTimeout { key: String, timeout: Duration },

    /// A correlated request is already waiting under `key`.
    #[error("a request is already pending for {0}")]
    DuplicateCorrelation(String),

    /// Settlement approval payload is truncated or failed authentication.
    #[error("decryption failed: {0}")]
    DecryptionFailure(String),

    /// A value does not fit the fixed-width encoding it was coerced into.
    #[error("overflow: {0}")]
    Overflow(String),

    /// The remote closed the stream or the network failed.
    #[error("stream disconnected: {0}")]
    StreamDisconnected(String),

    /// Non-success HTTP status.
    #[error("http {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true when the server rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Error::Status { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
        )
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidIdentifier(msg.into())
    }
}
