//! Error taxonomy for calls made through the work-log client.
//!
//! Every failed request lands in exactly one of three categories:
//! - business: the backend answered, but the envelope `code` is not 200
//! - unauthorized: the transport returned HTTP 401 and the session was dropped
//! - transport: connection failure, timeout, other HTTP status, unreadable body

use reqwest::StatusCode;
use thiserror::Error;

use super::envelope::Envelope;

/// Envelope code signalling success
pub const SUCCESS_CODE: i64 = 200;

/// Code carried by the normalized session-expiry rejection
pub const UNAUTHORIZED_CODE: u16 = 401;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Business,
    Unauthorized,
    Transport,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message} (code {code})")]
    Business {
        code: i64,
        message: String,
        envelope: Box<Envelope>,
    },

    #[error("{message}")]
    Unauthorized { code: u16, message: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with HTTP {0}")]
    Status(StatusCode),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("credential storage failed: {0}")]
    Storage(#[source] std::io::Error),

    #[error("failed to read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Business { .. } => ErrorKind::Business,
            ApiError::Unauthorized { .. } => ErrorKind::Unauthorized,
            _ => ErrorKind::Transport,
        }
    }

    /// Numeric code a caller can branch on: the envelope code for business
    /// errors, 401 for expiry, the HTTP status when one is known.
    pub fn code(&self) -> Option<i64> {
        match self {
            ApiError::Business { code, .. } => Some(*code),
            ApiError::Unauthorized { code, .. } => Some(i64::from(*code)),
            ApiError::Status(status) => Some(i64::from(status.as_u16())),
            ApiError::Http(err) => err.status().map(|s| i64::from(s.as_u16())),
            _ => None,
        }
    }

    /// The rejected envelope, for business errors only
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            ApiError::Business { envelope, .. } => Some(envelope),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Http(err) if err.is_timeout())
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        ApiError::Decode(message.into())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}
