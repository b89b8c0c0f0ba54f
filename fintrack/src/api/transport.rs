//! Authenticated HTTP exchange with the Bend API.
//!
//! Every call goes through [`Transport::execute`]: wait for the rate limiter,
//! attach device and session headers, send, decompress, then either decode
//! the `{meta, data, error}` envelope or classify the failure.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_ENCODING,
    CONTENT_TYPE, COOKIE, ORIGIN,
};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::decode::{decompress, summarize_error_body, truncate_chars};
use super::ratelimit::RateLimiter;
use crate::config::{
    DEFAULT_BASE_URL, DEFAULT_DEVICE_LOCATION, DEFAULT_DEVICE_TYPE, DEFAULT_RATE_LIMIT_MS,
    DEFAULT_TIMEOUT_MS,
};
use crate::error::{Error, Result, TransportError};
use crate::models::{describe_error, ApiResponse, ResponseMeta, Session};
use crate::session::DeviceIdentity;

/// Name of the opaque session cookie the service hands out.
pub const MARBLE_COOKIE: &str = "marble-cookie";

/// Log target for the request/response echo.
pub const HTTP_LOG_TARGET: &str = "fintrack::http";

const X_DEVICE_HASH: HeaderName = HeaderName::from_static("x-device-hash");
const X_DEVICE_TYPE: HeaderName = HeaderName::from_static("x-device-type");
const X_DEVICE_LOCATION: HeaderName = HeaderName::from_static("x-device-location");
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const ACCEPTED_ENCODINGS: &str = "gzip, deflate, br";
const LOGGED_BODY_LIMIT: usize = 1000;
const AUTHORIZATION_PREFIX: usize = 10;

/// Settings the transport needs, passed in explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub base_url: String,
    pub origin: String,
    pub timeout: Duration,
    pub rate_limit: Duration,
    pub device_type: String,
    pub device_location: String,
    /// Echo requests and responses on the `fintrack::http` target.
    pub log_http: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            origin: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            rate_limit: Duration::from_millis(DEFAULT_RATE_LIMIT_MS),
            device_type: DEFAULT_DEVICE_TYPE.to_string(),
            device_location: DEFAULT_DEVICE_LOCATION.to_string(),
            log_http: false,
        }
    }
}

/// Identity to present for a single request instead of the transport's own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub device: DeviceIdentity,
}

impl RequestIdentity {
    pub const fn new(device: DeviceIdentity) -> Self {
        Self { device }
    }
}

/// One outbound call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    identity: Option<RequestIdentity>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            identity: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Query pairs, appended form-encoded in the given order.
    #[must_use]
    pub fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query = pairs;
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = Some(serde_json::to_vec(body).map_err(TransportError::Encode)?);
        Ok(self)
    }

    /// Present `identity` for this call only.
    #[must_use]
    pub fn identity(mut self, identity: RequestIdentity) -> Self {
        self.identity = Some(identity);
        self
    }
}

/// A successful, decoded response.
#[derive(Debug, Clone)]
pub struct Exchange<T> {
    pub status: u16,
    pub meta: ResponseMeta,
    pub data: Option<T>,
    /// `X-Request-ID` sent with the call.
    pub request_id: String,
    /// `marble-cookie` set by the response, if any.
    pub marble_cookie: Option<String>,
}

impl<T> Exchange<T> {
    /// The envelope payload; a missing or null `data` is a decode failure.
    pub fn into_data(self) -> Result<T> {
        self.data.ok_or_else(|| {
            let err = <serde_json::Error as serde::de::Error>::custom("response has no data");
            Error::Transport(TransportError::Decode(err))
        })
    }
}

/// HTTP client bound to one device identity and at most one session.
#[derive(Debug)]
pub struct Transport {
    client: reqwest::Client,
    config: TransportConfig,
    device: DeviceIdentity,
    session: Option<Session>,
    limiter: RateLimiter,
}

impl Transport {
    pub fn new(config: TransportConfig, device: DeviceIdentity) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            limiter: RateLimiter::new(config.rate_limit),
            config,
            device,
            session: None,
        })
    }

    pub const fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Option<Session>) {
        self.session = session;
    }

    pub fn take_session(&mut self) -> Option<Session> {
        self.session.take()
    }

    /// Send `request` and decode its envelope into `T`.
    pub async fn execute<T: DeserializeOwned>(&mut self, request: ApiRequest) -> Result<Exchange<T>> {
        self.limiter.acquire().await;

        let url = self.url(&request.path, &request.query)?;
        let request_id = Uuid::new_v4().to_string();
        let device = request
            .identity
            .as_ref()
            .map_or(&self.device, |identity| &identity.device);
        let headers = self.headers(device, &request_id)?;

        if self.config.log_http {
            log_request(&request.method, &url, &headers, request.body.as_deref());
        }

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let started = Instant::now();
        let response = builder.send().await?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let marble_cookie = response
            .cookies()
            .find(|cookie| cookie.name() == MARBLE_COOKIE)
            .map(|cookie| cookie.value().to_string());
        let raw = response.bytes().await?;

        let encoding = response_headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let body = decompress(encoding, &raw)?;

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "request completed"
        );
        if self.config.log_http {
            log_response(status, &response_headers, &body);
        }

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: summarize_error_body(&body),
            });
        }

        if let (Some(cookie), Some(session)) = (&marble_cookie, self.session.as_mut()) {
            session.marble_cookie.clone_from(cookie);
        }

        let envelope: ApiResponse<T> =
            serde_json::from_slice(&body).map_err(TransportError::Decode)?;
        if let Some(error) = envelope.error {
            return Err(Error::Api {
                status: status.as_u16(),
                message: describe_error(&error),
            });
        }

        Ok(Exchange {
            status: status.as_u16(),
            meta: envelope.meta,
            data: envelope.data,
            request_id,
            marble_cookie,
        })
    }

    fn url(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let raw = format!("{}{path}", self.config.base_url);
        let mut url =
            Url::parse(&raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }

    fn headers(&self, device: &DeviceIdentity, request_id: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(ACCEPTED_ENCODINGS));
        headers.insert(ORIGIN, header_value(&ORIGIN, &self.config.origin)?);

        headers.insert(X_DEVICE_HASH, header_value(&X_DEVICE_HASH, device.as_str())?);
        headers.insert(X_DEVICE_TYPE, header_value(&X_DEVICE_TYPE, &self.config.device_type)?);
        headers.insert(
            X_DEVICE_LOCATION,
            header_value(&X_DEVICE_LOCATION, &self.config.device_location)?,
        );
        headers.insert(X_REQUEST_ID, header_value(&X_REQUEST_ID, request_id)?);

        if let Some(session) = &self.session {
            if let Some(authorization) = session.authorization_header() {
                let mut value = header_value(&AUTHORIZATION, &authorization)?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            if !session.marble_cookie.is_empty() {
                let cookie = format!("{MARBLE_COOKIE}={}", session.marble_cookie);
                headers.insert(COOKIE, header_value(&COOKIE, &cookie)?);
            }
        }

        Ok(headers)
    }
}

fn header_value(name: &HeaderName, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::InvalidInput(format!("value for {name} is not a valid header")))
}

/// First ten characters of an `Authorization` value, or `[REDACTED]` if it is that short.
pub fn mask_authorization(value: &str) -> String {
    if value.chars().count() > AUTHORIZATION_PREFIX {
        let prefix: String = value.chars().take(AUTHORIZATION_PREFIX).collect();
        format!("{prefix}...")
    } else {
        "[REDACTED]".to_string()
    }
}

fn render_headers(out: &mut String, headers: &HeaderMap) {
    let _ = writeln!(out, "Headers:");
    for (name, value) in headers {
        let value = value.to_str().unwrap_or("<non-ascii>");
        if *name == AUTHORIZATION {
            let _ = writeln!(out, "  {name}: {}", mask_authorization(value));
        } else {
            let _ = writeln!(out, "  {name}: {value}");
        }
    }
}

fn render_request(method: &Method, url: &Url, headers: &HeaderMap, body: Option<&[u8]>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== HTTP REQUEST ===");
    let _ = writeln!(out, "Method: {method}");
    let _ = writeln!(out, "URL: {url}");
    render_headers(&mut out, headers);
    if let Some(body) = body.filter(|b| !b.is_empty()) {
        let _ = writeln!(out, "Body: {}", String::from_utf8_lossy(body));
    }
    out
}

fn render_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== HTTP RESPONSE ===");
    let _ = writeln!(out, "Status: {status}");
    render_headers(&mut out, headers);
    if !body.is_empty() {
        let text = String::from_utf8_lossy(body);
        let _ = writeln!(out, "Body: {}", truncate_chars(&text, LOGGED_BODY_LIMIT));
    }
    out
}

fn log_request(method: &Method, url: &Url, headers: &HeaderMap, body: Option<&[u8]>) {
    tracing::info!(target: HTTP_LOG_TARGET, "\n{}", render_request(method, url, headers, body));
}

fn log_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) {
    tracing::info!(target: HTTP_LOG_TARGET, "\n{}", render_response(status, headers, body));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{MockResponse, MockServer};
    use serde_json::{json, Value};

    fn transport_for(server: &MockServer) -> Transport {
        let config = TransportConfig {
            base_url: server.base_url(),
            origin: "https://app.test".to_string(),
            rate_limit: Duration::ZERO,
            timeout: Duration::from_secs(5),
            ..TransportConfig::default()
        };
        Transport::new(config, DeviceIdentity::new("device-1")).unwrap()
    }

    fn ok_body(data: &Value) -> Value {
        json!({"meta": {"request_id": "r", "timestamp": "t", "uri": "/"}, "data": data, "error": null})
    }

    #[tokio::test]
    async fn test_standard_and_device_headers() {
        let server = MockServer::start(|_| MockResponse::json(200, &ok_body(&json!({})))).await;
        let mut transport = transport_for(&server);

        transport
            .execute::<Value>(ApiRequest::get("/api/v2/users/me"))
            .await
            .unwrap();

        let request = server.last_request();
        assert_eq!(request.path, "/api/v2/users/me");
        assert_eq!(request.header("content-type").as_deref(), Some("application/json"));
        assert_eq!(request.header("accept").as_deref(), Some("application/json"));
        assert_eq!(request.header("accept-encoding").as_deref(), Some("gzip, deflate, br"));
        assert_eq!(request.header("origin").as_deref(), Some("https://app.test"));
        assert_eq!(request.header("x-device-hash").as_deref(), Some("device-1"));
        assert_eq!(request.header("x-device-type").as_deref(), Some("Web"));
        assert_eq!(request.header("x-device-location").as_deref(), Some("Default"));
        assert!(Uuid::parse_str(&request.header("x-request-id").unwrap()).is_ok());
        assert!(request.header("authorization").is_none());
        assert!(request.header("cookie").is_none());
    }

    #[tokio::test]
    async fn test_session_headers() {
        let server = MockServer::start(|_| MockResponse::json(200, &ok_body(&json!({})))).await;
        let mut transport = transport_for(&server);
        transport.set_session(Some(Session {
            access_token: "tok".to_string(),
            token_type: String::new(),
            marble_cookie: "c1".to_string(),
            ..Session::default()
        }));

        transport
            .execute::<Value>(ApiRequest::get("/api/v1/aa/data"))
            .await
            .unwrap();

        let request = server.last_request();
        assert_eq!(request.header("authorization").as_deref(), Some("Bearer tok"));
        assert_eq!(request.header("cookie").as_deref(), Some("marble-cookie=c1"));
    }

    #[tokio::test]
    async fn test_request_ids_differ_per_call() {
        let server = MockServer::start(|_| MockResponse::json(200, &ok_body(&json!({})))).await;
        let mut transport = transport_for(&server);

        let first = transport.execute::<Value>(ApiRequest::get("/a")).await.unwrap();
        let second = transport.execute::<Value>(ApiRequest::get("/a")).await.unwrap();
        assert_ne!(first.request_id, second.request_id);

        let requests = server.requests();
        assert_eq!(requests[0].header("x-request-id").unwrap(), first.request_id);
    }

    #[tokio::test]
    async fn test_identity_override_leaves_transport_device() {
        let server = MockServer::start(|_| MockResponse::json(200, &ok_body(&json!({})))).await;
        let mut transport = transport_for(&server);

        let request = ApiRequest::post("/otp")
            .identity(RequestIdentity::new(DeviceIdentity::new("transient")));
        transport.execute::<Value>(request).await.unwrap();

        assert_eq!(server.last_request().header("x-device-hash").as_deref(), Some("transient"));
        assert_eq!(transport.device().as_str(), "device-1");
    }

    #[tokio::test]
    async fn test_query_and_body_are_sent() {
        let server = MockServer::start(|_| MockResponse::json(200, &ok_body(&json!({})))).await;
        let mut transport = transport_for(&server);

        let request = ApiRequest::post("/p")
            .query(vec![
                ("limit".to_string(), "5".to_string()),
                ("include[]".to_string(), "count_by_totals".to_string()),
            ])
            .json(&json!({"refresh_token": "abc"}))
            .unwrap();
        transport.execute::<Value>(request).await.unwrap();

        let recorded = server.last_request();
        assert_eq!(recorded.method, "POST");
        assert_eq!(
            recorded.query.as_deref(),
            Some("limit=5&include%5B%5D=count_by_totals")
        );
        assert_eq!(recorded.json(), json!({"refresh_token": "abc"}));
    }

    #[tokio::test]
    async fn test_marble_cookie_captured_into_session() {
        let server = MockServer::start(|_| {
            MockResponse::json(200, &ok_body(&json!({})))
                .header("set-cookie", "marble-cookie=fresh; Path=/; HttpOnly")
        })
        .await;
        let mut transport = transport_for(&server);
        transport.set_session(Some(Session {
            marble_cookie: "stale".to_string(),
            ..Session::default()
        }));

        let exchange = transport.execute::<Value>(ApiRequest::get("/a")).await.unwrap();

        assert_eq!(exchange.marble_cookie.as_deref(), Some("fresh"));
        assert_eq!(transport.session().unwrap().marble_cookie, "fresh");
    }

    #[tokio::test]
    async fn test_cookie_ignored_on_failure() {
        let server = MockServer::start(|_| {
            MockResponse::text(500, "boom").header("set-cookie", "marble-cookie=fresh")
        })
        .await;
        let mut transport = transport_for(&server);
        transport.set_session(Some(Session {
            marble_cookie: "stale".to_string(),
            ..Session::default()
        }));

        let err = transport.execute::<Value>(ApiRequest::get("/a")).await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert_eq!(transport.session().unwrap().marble_cookie, "stale");
    }

    #[tokio::test]
    async fn test_non_2xx_truncates_body() {
        let long = "e".repeat(5000);
        let server = MockServer::start(move |_| MockResponse::text(502, &long)).await;
        let mut transport = transport_for(&server);

        let err = transport.execute::<Value>(ApiRequest::get("/a")).await.unwrap_err();
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, format!("{}...", "e".repeat(200)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_2xx_surfaces_envelope_error() {
        let server = MockServer::start(|_| {
            MockResponse::json(401, &json!({"data": null, "error": "token expired"}))
        })
        .await;
        let mut transport = transport_for(&server);

        let err = transport.execute::<Value>(ApiRequest::get("/a")).await.unwrap_err();
        assert!(err.is_reauth_required());
        assert_eq!(err.to_string(), "API request failed with status 401: token expired");
    }

    #[tokio::test]
    async fn test_error_envelope_on_2xx_is_failure() {
        let server = MockServer::start(|_| {
            MockResponse::json(200, &json!({"data": null, "error": {"message": "bad otp"}}))
        })
        .await;
        let mut transport = transport_for(&server);

        let err = transport.execute::<Value>(ApiRequest::get("/a")).await.unwrap_err();
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 200);
                assert_eq!(message, "bad otp");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_gzip_response_is_decoded() {
        let server =
            MockServer::start(|_| MockResponse::json(200, &ok_body(&json!({"n": 7}))).gzip()).await;
        let mut transport = transport_for(&server);

        let data = transport
            .execute::<Value>(ApiRequest::get("/a"))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(data["n"], 7);
    }

    #[tokio::test]
    async fn test_brotli_response_is_decoded() {
        let server =
            MockServer::start(|_| MockResponse::json(200, &ok_body(&json!({"n": 8}))).brotli()).await;
        let mut transport = transport_for(&server);

        let data = transport
            .execute::<Value>(ApiRequest::get("/a"))
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(data["n"], 8);
    }

    #[tokio::test]
    async fn test_undecodable_success_is_transport_error() {
        let server = MockServer::start(|_| MockResponse::text(200, "<html>")).await;
        let mut transport = transport_for(&server);

        let err = transport.execute::<Value>(ApiRequest::get("/a")).await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Decode(_))));
    }

    #[tokio::test]
    async fn test_missing_data_is_decode_error() {
        let server = MockServer::start(|_| MockResponse::json(200, &ok_body(&Value::Null))).await;
        let mut transport = transport_for(&server);

        let exchange = transport.execute::<Value>(ApiRequest::get("/a")).await.unwrap();
        assert!(exchange.data.is_none());
        assert!(matches!(
            exchange.into_data(),
            Err(Error::Transport(TransportError::Decode(_)))
        ));
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        let config = TransportConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            rate_limit: Duration::ZERO,
            timeout: Duration::from_secs(2),
            ..TransportConfig::default()
        };
        let mut transport = Transport::new(config, DeviceIdentity::new("d")).unwrap();

        let err = transport.execute::<Value>(ApiRequest::get("/a")).await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Http(_))));
        assert!(!err.is_reauth_required());
    }

    #[test]
    fn test_mask_authorization() {
        assert_eq!(mask_authorization("Bearer abcdefghijkl"), "Bearer abc...");
        assert_eq!(mask_authorization("Bearer x"), "[REDACTED]");
        assert_eq!(mask_authorization("0123456789"), "[REDACTED]");
    }

    #[test]
    fn test_rendered_request_masks_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer supersecrettoken"));
        headers.insert(X_DEVICE_HASH, HeaderValue::from_static("d1"));
        let url = Url::parse("https://api.test/x").unwrap();

        let rendered = render_request(&Method::POST, &url, &headers, Some(b"{}"));
        assert!(rendered.contains("authorization: Bearer sup..."));
        assert!(!rendered.contains("supersecrettoken"));
        assert!(rendered.contains("x-device-hash: d1"));
        assert!(rendered.contains("Body: {}"));
    }

    #[test]
    fn test_rendered_response_truncates_body() {
        let body = "b".repeat(1500);
        let rendered = render_response(StatusCode::OK, &HeaderMap::new(), body.as_bytes());
        assert!(rendered.contains(&format!("Body: {}...", "b".repeat(1000))));
        assert!(!rendered.contains(&"b".repeat(1001)));
    }
}
