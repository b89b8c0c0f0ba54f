//! Bend API client.
//!
//! Wraps a [`Transport`] and exposes one method per remote operation. The
//! authentication flows live in `auth.rs`, the transaction fetcher in
//! `transactions.rs`.

use chrono::Utc;

use super::transport::{ApiRequest, Transport, TransportConfig};
use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::models::{Account, AccountData, Session, UserData, UserInfo};
use crate::session::DeviceIdentity;

pub(crate) const USER_ME_PATH: &str = "/api/v2/users/me";
pub(crate) const ACCOUNTS_PATH: &str = "/api/v1/aa/data";

/// Client for one user and one device.
#[derive(Debug)]
pub struct BendClient {
    pub(crate) transport: Transport,
}

impl BendClient {
    pub fn new(config: TransportConfig, device: DeviceIdentity) -> Result<Self> {
        Ok(Self {
            transport: Transport::new(config, device)?,
        })
    }

    /// Build a client from the loaded configuration, resolving the device identity.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.transport(), config.device_identity())
    }

    pub const fn device(&self) -> &DeviceIdentity {
        self.transport.device()
    }

    pub const fn session(&self) -> Option<&Session> {
        self.transport.session()
    }

    pub fn set_session(&mut self, session: Session) {
        self.transport.set_session(Some(session));
    }

    pub fn clear_session(&mut self) -> Option<Session> {
        self.transport.take_session()
    }

    /// Held session, or [`SessionError::Missing`].
    pub(crate) fn require_session(&self) -> Result<&Session> {
        Ok(self.transport.session().ok_or(SessionError::Missing)?)
    }

    /// Fetch the current user, proving the session is accepted.
    pub async fn check_session(&mut self) -> Result<UserInfo> {
        if self.require_session()?.is_expired_at(Utc::now()) {
            return Err(SessionError::Expired.into());
        }

        let data: UserData = self
            .transport
            .execute(ApiRequest::get(USER_ME_PATH))
            .await?
            .into_data()?;
        Ok(data.user)
    }

    pub async fn user_id(&mut self) -> Result<String> {
        Ok(self.check_session().await?.uuid)
    }

    /// Linked accounts with balances.
    pub async fn accounts(&mut self) -> Result<Vec<Account>> {
        self.require_session()?;

        let data: AccountData = self
            .transport
            .execute(ApiRequest::get(ACCOUNTS_PATH))
            .await?
            .into_data()?;
        tracing::debug!(count = data.accounts.len(), "accounts fetched");
        Ok(data.accounts)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::mock::{MockResponse, MockServer};
    use crate::error::Error;
    use chrono::Duration;
    use serde_json::{json, Value};

    pub(crate) fn envelope(data: &Value) -> Value {
        json!({"meta": {"request_id": "r", "timestamp": "t", "uri": "/"}, "data": data, "error": null})
    }

    pub(crate) fn client_for(server: &MockServer, device: &str) -> BendClient {
        let config = TransportConfig {
            base_url: server.base_url(),
            rate_limit: std::time::Duration::ZERO,
            ..TransportConfig::default()
        };
        BendClient::new(config, DeviceIdentity::new(device)).unwrap()
    }

    pub(crate) fn live_session() -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            token_type: "Bearer".to_string(),
            marble_cookie: String::new(),
            device_hash: "d1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_check_session_returns_user() {
        let server = MockServer::start(|req| {
            assert_eq!(req.path, USER_ME_PATH);
            MockResponse::json(
                200,
                &envelope(&json!({
                    "user": {"uuid": "u-1", "first_name": "Asha", "last_name": "Rao"},
                    "route": "home"
                })),
            )
        })
        .await;
        let mut client = client_for(&server, "d1");
        client.set_session(live_session());

        let user = client.check_session().await.unwrap();
        assert_eq!(user.uuid, "u-1");
        assert_eq!(user.full_name(), "Asha Rao");
        assert_eq!(
            server.last_request().header("authorization").as_deref(),
            Some("Bearer access")
        );
    }

    #[tokio::test]
    async fn test_check_session_without_session() {
        let server = MockServer::start(|_| MockResponse::json(200, &envelope(&json!({})))).await;
        let mut client = client_for(&server, "d1");

        let err = client.check_session().await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::Missing)));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn test_check_session_expired_locally() {
        let server = MockServer::start(|_| MockResponse::json(200, &envelope(&json!({})))).await;
        let mut client = client_for(&server, "d1");
        client.set_session(Session {
            expires_at: Some(Utc::now() - Duration::minutes(1)),
            ..live_session()
        });

        let err = client.check_session().await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::Expired)));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn test_user_id() {
        let server = MockServer::start(|_| {
            MockResponse::json(200, &envelope(&json!({"user": {"uuid": "u-9"}})))
        })
        .await;
        let mut client = client_for(&server, "d1");
        client.set_session(live_session());

        assert_eq!(client.user_id().await.unwrap(), "u-9");
    }

    #[tokio::test]
    async fn test_accounts() {
        let server = MockServer::start(|req| {
            assert_eq!(req.path, ACCOUNTS_PATH);
            MockResponse::json(
                200,
                &envelope(&json!({
                    "accounts": [
                        {
                            "uuid": "a-1",
                            "type": "deposit",
                            "current_balance": 1250.5,
                            "currency": "INR",
                            "financial_information_provider": {"name": "Bank One"}
                        },
                        {"uuid": "a-2", "nickname": "Savings"}
                    ]
                })),
            )
        })
        .await;
        let mut client = client_for(&server, "d1");
        client.set_session(live_session());

        let accounts = client.accounts().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].kind, "deposit");
        assert_eq!(accounts[0].display_name(), "Bank One");
        assert_eq!(accounts[1].display_name(), "Savings");
    }

    #[tokio::test]
    async fn test_accounts_unauthorized() {
        let server = MockServer::start(|_| {
            MockResponse::json(401, &json!({"data": null, "error": "unauthorized"}))
        })
        .await;
        let mut client = client_for(&server, "d1");
        client.set_session(live_session());

        let err = client.accounts().await.unwrap_err();
        assert!(err.is_reauth_required());
    }
}
