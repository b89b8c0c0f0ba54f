//! Error types for the Bend client.
//!
//! The command layer wraps these in `anyhow`; everything below it returns
//! [`Result`] so callers can decide on fallback from the variant.

use std::path::PathBuf;

use thiserror::Error;

/// Failures below the API layer: the request never produced a usable response.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection, TLS or timeout failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The body could not be decompressed according to its `Content-Encoding`.
    #[error("failed to decompress {encoding} response: {source}")]
    Decompress {
        encoding: String,
        #[source]
        source: std::io::Error,
    },

    /// A 2xx body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    /// The request body could not be serialized.
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

/// Failures around the locally held or persisted session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session file does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to access session file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session file {} is not a valid session: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no session available")]
    Missing,

    #[error("session expired")]
    Expired,

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("failed to parse expires_at {0:?}")]
    InvalidExpiry(String),
}

/// Top-level error for every client operation.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The service answered with a non-2xx status or a non-null `error` envelope.
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether the operator has to log in again before retrying.
    pub const fn is_reauth_required(&self) -> bool {
        match self {
            Self::Session(_) => true,
            Self::Api { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }

    /// HTTP status of an API failure.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(TransportError::Http(err))
    }
}

/// Result alias used throughout the client.
pub type Result<T> = std::result::Result<T, Error>;
