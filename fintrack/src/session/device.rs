//! Per-installation device identity.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier sent as `X-Device-Hash` on every request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh UUID-v4 shaped identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Read the persisted identity, creating and persisting one if the file
    /// is missing, empty or unreadable.
    ///
    /// A failed write is logged; the freshly generated identity is still
    /// returned so the current run can proceed.
    pub fn load_or_create(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) if !content.trim().is_empty() => return Self(content.trim().to_string()),
            Ok(_) => tracing::debug!(path = %path.display(), "device identity file is empty"),
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "device identity not readable"),
        }

        let identity = Self::generate();
        if let Err(e) = identity.persist(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to persist device identity");
        }
        identity
    }

    fn persist(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, &self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generate_is_uuid_v4() {
        let id = DeviceIdentity::generate();
        let parsed = Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_ne!(id, DeviceIdentity::generate());
    }

    #[test]
    fn test_load_or_create_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config").join("device_hash");

        let first = DeviceIdentity::load_or_create(&path);
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), first.as_str());

        let second = DeviceIdentity::load_or_create(&path);
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_existing_trims() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device_hash");
        fs::write(&path, "d1\n").unwrap();

        assert_eq!(DeviceIdentity::load_or_create(&path).as_str(), "d1");
    }

    #[test]
    fn test_empty_file_regenerates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device_hash");
        fs::write(&path, "  ").unwrap();

        let id = DeviceIdentity::load_or_create(&path);
        assert!(Uuid::parse_str(id.as_str()).is_ok());
        assert_eq!(fs::read_to_string(&path).unwrap(), id.as_str());
    }
}
