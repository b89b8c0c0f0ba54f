//! Configuration management.
//!
//! Defaults, then a JSON config file, then `FINTRACK_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::TransportConfig;
use crate::error::{Error, Result};
use crate::session::{atomic_write_private, DeviceIdentity};

pub const DEFAULT_BASE_URL: &str = "https://bend.example.com";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RATE_LIMIT_MS: u64 = 1_000;
pub const DEFAULT_DEVICE_TYPE: &str = "Web";
pub const DEFAULT_DEVICE_LOCATION: &str = "Default";

const CONFIG_FILE: &str = "config.json";
const SESSION_FILE: &str = "session.json";
const DEVICE_HASH_FILE: &str = "device_hash";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service base URL, without a trailing slash.
    pub base_url: String,
    /// `Origin` header; defaults to the base URL.
    pub origin: Option<String>,
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// Minimum spacing between outbound requests.
    pub rate_limit_ms: u64,
    pub session_file: PathBuf,
    pub device_hash_file: PathBuf,
    /// Long-lived token used to bootstrap a session.
    pub refresh_token: Option<String>,
    /// Explicit device identity; otherwise read from `device_hash_file`.
    pub device_hash: Option<String>,
    pub device_type: String,
    pub device_location: String,
    /// Echo HTTP requests and responses to the log.
    pub log_http: bool,

    /// File this configuration was read from.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let dir = config_dir();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            origin: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            session_file: dir.join(SESSION_FILE),
            device_hash_file: dir.join(DEVICE_HASH_FILE),
            refresh_token: None,
            device_hash: None,
            device_type: DEFAULT_DEVICE_TYPE.to_string(),
            device_location: DEFAULT_DEVICE_LOCATION.to_string(),
            log_http: false,
            source: None,
        }
    }
}

/// `~/.config/fintrack`, or `.fintrack` when there is no home directory.
pub fn config_dir() -> PathBuf {
    dirs::home_dir().map_or_else(
        || PathBuf::from(".fintrack"),
        |home| home.join(".config").join("fintrack"),
    )
}

/// Default config file location.
pub fn default_config_file() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

impl Config {
    /// Load configuration. An explicit path must exist; the default path is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = Self::load_unvalidated(explicit)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, file and environment, without `validate`.
    pub fn load_unvalidated(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let path = default_config_file();
                if path.exists() {
                    Self::load_from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.expand_paths();
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Write the configuration as pretty JSON, creating parent directories.
    /// The file holds the refresh token, so it is owner-only like the session.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::Config(format!("failed to create {}: {e}", dir.display())))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;
        atomic_write_private(path, content.as_bytes())
            .map_err(|e| Error::Config(format!("failed to write {}: {e}", path.display())))
    }

    /// Path `save` should write to: the file this was loaded from, or the default.
    pub fn target_file(&self) -> PathBuf {
        self.source.clone().unwrap_or_else(default_config_file)
    }

    /// Copy with credentials obtained from an OTP exchange.
    #[must_use]
    pub fn with_credentials(&self, device_hash: &DeviceIdentity, refresh_token: &str) -> Self {
        Self {
            device_hash: Some(device_hash.to_string()),
            refresh_token: Some(refresh_token.to_string()),
            ..self.clone()
        }
    }

    /// Override fields from `FINTRACK_*` variables resolved through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FINTRACK_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("FINTRACK_REFRESH_TOKEN") {
            self.refresh_token = Some(v);
        }
        if let Some(v) = lookup("FINTRACK_DEVICE_HASH") {
            self.device_hash = Some(v);
        }
        if let Some(v) = lookup("FINTRACK_SESSION_FILE") {
            self.session_file = PathBuf::from(v);
        }
        if let Some(ms) = lookup("FINTRACK_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.timeout_ms = ms;
        }
        if let Some(ms) = lookup("FINTRACK_RATE_LIMIT_MS").and_then(|v| v.parse().ok()) {
            self.rate_limit_ms = ms;
        }
    }

    /// Expand `~` and resolve relative paths against the config file's directory.
    pub fn expand_paths(&mut self) {
        let base = self
            .source
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        self.session_file = expand_path(&self.session_file, base.as_deref());
        self.device_hash_file = expand_path(&self.device_hash_file, base.as_deref());
    }

    pub fn validate(&self) -> Result<()> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(Error::Config("base_url is required".to_string()));
        }
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(Error::Config(format!(
                "base_url must be an http(s) URL, got {base_url:?}"
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be greater than zero".to_string()));
        }
        if self.session_file.as_os_str().is_empty() {
            return Err(Error::Config("session_file is required".to_string()));
        }
        Ok(())
    }

    /// Explicit device hash, else the persisted installation identity.
    pub fn device_identity(&self) -> DeviceIdentity {
        match self.device_hash.as_deref().filter(|h| !h.is_empty()) {
            Some(hash) => DeviceIdentity::new(hash),
            None => DeviceIdentity::load_or_create(&self.device_hash_file),
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    /// The subset of settings the transport needs.
    pub fn transport(&self) -> TransportConfig {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        TransportConfig {
            origin: self.origin.clone().unwrap_or_else(|| base_url.clone()),
            base_url,
            timeout: Duration::from_millis(self.timeout_ms),
            rate_limit: Duration::from_millis(self.rate_limit_ms),
            device_type: self.device_type.clone(),
            device_location: self.device_location.clone(),
            log_http: self.log_http,
        }
    }

    /// One setting by field name. Unset optional settings count as missing.
    pub fn get_value(&self, key: &str) -> Result<String> {
        match self.fields()?.remove(key) {
            None | Some(Value::Null) => Err(Error::Config(format!("key '{key}' not found"))),
            Some(Value::String(value)) => Ok(value),
            Some(other) => Ok(other.to_string()),
        }
    }

    /// Set one setting by field name, parsing `value` as that field's type.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let mut fields = self.fields()?;
        let slot = fields
            .get_mut(key)
            .ok_or_else(|| Error::Config(format!("unknown key '{key}'")))?;

        let parsed = match slot {
            Value::Number(_) => value.parse::<u64>().map(Value::from).map_err(|_| {
                Error::Config(format!("{key} must be a non-negative integer, got {value:?}"))
            })?,
            Value::Bool(_) => value
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|_| Error::Config(format!("{key} must be true or false, got {value:?}")))?,
            _ => Value::String(value.to_string()),
        };
        *slot = parsed;

        let mut updated: Self = serde_json::from_value(Value::Object(fields))
            .map_err(|e| Error::Config(format!("invalid value for {key}: {e}")))?;
        updated.source = self.source.take();
        *self = updated;
        Ok(())
    }

    fn fields(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(_) => Err(Error::Config("config is not a JSON object".to_string())),
            Err(e) => Err(Error::Config(format!("failed to serialize config: {e}"))),
        }
    }

    /// Copy safe to print: the refresh token is masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            refresh_token: self.refresh_token.as_deref().map(mask_secret),
            ..self.clone()
        }
    }
}

fn expand_path(path: &Path, base: Option<&Path>) -> PathBuf {
    if path.as_os_str().is_empty() {
        return path.to_path_buf();
    }

    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    match base {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}

/// Keep the first four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}****")
}
