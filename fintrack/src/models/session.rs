//! Session model representing an authenticated Bend identity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A session stops counting as valid this long before its real expiry.
pub const SESSION_EXPIRY_BUFFER: Duration = Duration::minutes(5);

/// Token type used when the server did not send one.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Credentials for the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    /// Short-lived bearer credential.
    pub access_token: String,
    /// Long-lived credential, rotated by every refresh.
    pub refresh_token: String,
    /// When the access token stops being accepted.
    pub expires_at: Option<DateTime<Utc>>,
    /// Scheme used in the `Authorization` header.
    pub token_type: String,
    /// Opaque `marble-cookie` value echoed back on every call.
    pub marble_cookie: String,
    /// Device identity the session was created with.
    pub device_hash: String,
}

impl Session {
    /// Ephemeral record used to bootstrap a session from a refresh token.
    pub fn from_refresh_token(refresh_token: impl Into<String>, device_hash: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            device_hash: device_hash.into(),
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            ..Self::default()
        }
    }

    /// Valid iff there is an access token and `now + 5m` is before expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        self.expires_at
            .is_some_and(|expires_at| now + SESSION_EXPIRY_BUFFER < expires_at)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Whether the access token is past its expiry, ignoring the buffer.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| now > expires_at)
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Value for the `Authorization` header, if there is an access token.
    pub fn authorization_header(&self) -> Option<String> {
        if self.access_token.is_empty() {
            return None;
        }
        let scheme = if self.token_type.is_empty() {
            DEFAULT_TOKEN_TYPE
        } else {
            &self.token_type
        };
        Some(format!("{scheme} {}", self.access_token))
    }
}
