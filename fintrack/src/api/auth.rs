//! Authentication flows.
//!
//! Refresh-token bootstrap: exchange a long-lived refresh token for an access
//! token. OTP bootstrap: request a code for a phone number, verify it, and
//! use the refresh token it yields. Neither flow retries; fallback between
//! them is up to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::client::BendClient;
use super::transport::{ApiRequest, RequestIdentity};
use crate::error::{Error, Result, SessionError, TransportError};
use crate::models::Session;
use crate::session::DeviceIdentity;

pub const REFRESH_PATH: &str = "/api/v1/auth/tokens/refresh";
pub const OTP_PATH: &str = "/api/v1/auth/otp";
pub const DEFAULT_OTP_CHANNEL: &str = "sms";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Unauthenticated,
    Refreshing,
    Authenticated,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpState {
    Idle,
    OtpRequested,
    OtpVerifying,
    TokenIssued,
    Failed,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenData {
    token_type: String,
    access_token: String,
    refresh_token: String,
    expires_at: String,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    otp: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VerifyData {
    refresh_token: String,
}

/// The values both OTP calls must share.
///
/// The server pairs "verify" with the earlier "request" by device identity
/// and request id, so both are fixed when the exchange is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpExchange {
    phone: String,
    channel: String,
    request_id: String,
    device: DeviceIdentity,
}

impl OtpExchange {
    /// New exchange over SMS with a fresh request id and device identity.
    pub fn new(phone: &str) -> Result<Self> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(Error::InvalidInput("phone number is required".to_string()));
        }
        Ok(Self {
            phone: phone.to_string(),
            channel: DEFAULT_OTP_CHANNEL.to_string(),
            request_id: Uuid::new_v4().to_string(),
            device: DeviceIdentity::generate(),
        })
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub const fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    fn request_path(&self) -> String {
        format!(
            "{OTP_PATH}/{}/{}/{}",
            urlencoding::encode(&self.phone),
            urlencoding::encode(&self.channel),
            self.request_id
        )
    }

    fn verify_path(&self) -> String {
        format!("{}/verify", self.request_path())
    }

    fn identity(&self) -> RequestIdentity {
        RequestIdentity::new(self.device.clone())
    }
}

/// Result of a successful OTP verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpVerification {
    pub refresh_token: String,
    /// `marble-cookie` set by the verify response.
    pub marble_cookie: Option<String>,
}

fn refresh_transition(state: RefreshState) {
    tracing::debug!(?state, "refresh flow");
}

fn otp_transition(state: OtpState, exchange: &OtpExchange) {
    tracing::debug!(?state, request_id = exchange.request_id(), "otp flow");
}

impl BendClient {
    /// Exchange the held session's refresh token for new tokens.
    ///
    /// The refresh call presents the device the session was created with. On
    /// failure the held session is left as it was.
    pub async fn refresh_session(&mut self) -> Result<()> {
        let snapshot = self.require_session()?.clone();
        if !snapshot.has_refresh_token() {
            return Err(SessionError::NoRefreshToken.into());
        }

        refresh_transition(RefreshState::Refreshing);
        match self.exchange_refresh_token(&snapshot).await {
            Ok(refreshed) => {
                self.set_session(refreshed);
                refresh_transition(RefreshState::Authenticated);
                Ok(())
            }
            Err(e) => {
                self.set_session(snapshot);
                refresh_transition(RefreshState::Failed);
                Err(e)
            }
        }
    }

    async fn exchange_refresh_token(&mut self, snapshot: &Session) -> Result<Session> {
        let mut request = ApiRequest::post(REFRESH_PATH).json(&RefreshRequest {
            refresh_token: &snapshot.refresh_token,
        })?;
        if !snapshot.device_hash.is_empty() {
            request = request.identity(RequestIdentity::new(DeviceIdentity::new(
                snapshot.device_hash.clone(),
            )));
        }

        let tokens: TokenData = self.transport.execute(request).await?.into_data()?;
        let expires_at = DateTime::parse_from_rfc3339(&tokens.expires_at)
            .map_err(|_| SessionError::InvalidExpiry(tokens.expires_at.clone()))?
            .with_timezone(&Utc);

        // The transport may have stored a fresh cookie during the call.
        let current = self.session().cloned().unwrap_or_else(|| snapshot.clone());
        Ok(Session {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_at: Some(expires_at),
            ..current
        })
    }

    /// Bootstrap a session from a refresh token. On failure the client holds no session.
    pub async fn initialize_from_refresh_token(&mut self, refresh_token: &str) -> Result<()> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(SessionError::NoRefreshToken.into());
        }

        refresh_transition(RefreshState::Unauthenticated);
        let session = Session::from_refresh_token(refresh_token, self.device().as_str());
        self.set_session(session);

        if let Err(e) = self.refresh_session().await {
            self.clear_session();
            return Err(e);
        }
        Ok(())
    }

    /// Ask the service to send a code for `exchange`.
    pub async fn request_otp(&mut self, exchange: &OtpExchange) -> Result<()> {
        otp_transition(OtpState::Idle, exchange);

        let request = ApiRequest::post(exchange.request_path()).identity(exchange.identity());
        match self.transport.execute::<serde_json::Value>(request).await {
            Ok(response) => {
                tracing::debug!(
                    status = response.status,
                    request_id = %response.request_id,
                    server_request_id = %response.meta.request_id,
                    "otp request accepted"
                );
                otp_transition(OtpState::OtpRequested, exchange);
                Ok(())
            }
            Err(e) => {
                otp_transition(OtpState::Failed, exchange);
                Err(e)
            }
        }
    }

    /// Verify `code` for a previously requested exchange.
    pub async fn verify_otp(&mut self, exchange: &OtpExchange, code: &str) -> Result<OtpVerification> {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::InvalidInput("OTP code is required".to_string()));
        }

        otp_transition(OtpState::OtpVerifying, exchange);
        match self.send_verify(exchange, code).await {
            Ok(verification) => {
                otp_transition(OtpState::TokenIssued, exchange);
                Ok(verification)
            }
            Err(e) => {
                otp_transition(OtpState::Failed, exchange);
                Err(e)
            }
        }
    }

    async fn send_verify(&mut self, exchange: &OtpExchange, code: &str) -> Result<OtpVerification> {
        let request = ApiRequest::post(exchange.verify_path())
            .json(&VerifyRequest { otp: code })?
            .identity(exchange.identity());

        let response = self.transport.execute::<VerifyData>(request).await?;
        let marble_cookie = response.marble_cookie.clone();
        let data = response.into_data()?;
        if data.refresh_token.is_empty() {
            let err = <serde_json::Error as serde::de::Error>::custom(
                "verify response has no refresh_token",
            );
            return Err(TransportError::Decode(err).into());
        }

        Ok(OtpVerification {
            refresh_token: data.refresh_token,
            marble_cookie,
        })
    }

    /// Verify `code` and bootstrap a session from the issued refresh token.
    ///
    /// The new session is bound to the exchange's device and starts with the
    /// cookie returned by the verify call. The client's own device identity
    /// is never changed.
    pub async fn login_with_otp(&mut self, exchange: &OtpExchange, code: &str) -> Result<OtpVerification> {
        let verification = self.verify_otp(exchange, code).await?;

        let mut session =
            Session::from_refresh_token(&verification.refresh_token, exchange.device().as_str());
        session.marble_cookie = verification.marble_cookie.clone().unwrap_or_default();
        self.set_session(session);

        if let Err(e) = self.refresh_session().await {
            self.clear_session();
            return Err(e);
        }
        Ok(verification)
    }
}
