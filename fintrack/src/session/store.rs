//! Session persistence.
//!
//! One JSON file, owner-only permissions, replaced atomically on save.
//! There is no locking: two processes refreshing at the same time can
//! overwrite each other's result, and the last writer wins.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Duration, Utc};

use crate::error::SessionError;
use crate::models::Session;

/// Summary of the persisted session, computed without failing on a missing file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub exists: bool,
    pub valid: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// Only set when the session is valid.
    pub time_remaining: Option<Duration>,
    pub has_refresh_token: bool,
}

/// Reads and writes the session file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the session. The previous file stays in place until the new
    /// content is fully on disk.
    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        let content = serde_json::to_string_pretty(session).map_err(|source| {
            SessionError::Decode {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| self.io_error(source))?;
        }

        atomic_write_private(&self.path, content.as_bytes()).map_err(|source| self.io_error(source))?;
        tracing::debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    pub fn load(&self) -> Result<Session, SessionError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(self.path.clone()));
            }
            Err(source) => return Err(self.io_error(source)),
        };

        serde_json::from_str(&content).map_err(|source| SessionError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    /// Describe the stored session. A missing or unreadable file reports
    /// "does not exist, not valid".
    pub fn describe(&self) -> SessionInfo {
        self.describe_at(Utc::now())
    }

    pub fn describe_at(&self, now: DateTime<Utc>) -> SessionInfo {
        let Ok(session) = self.load() else {
            return SessionInfo::default();
        };

        let valid = session.is_valid_at(now);
        SessionInfo {
            exists: true,
            valid,
            expires_at: session.expires_at,
            time_remaining: session
                .expires_at
                .filter(|_| valid)
                .map(|expires_at| expires_at - now),
            has_refresh_token: session.has_refresh_token(),
        }
    }

    /// Remove the session file. Missing files are not an error.
    pub fn delete(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Write to a sibling temp file with mode 0600, then rename over `path`.
pub(crate) fn atomic_write_private(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;

    let tmp_path = dir.join(format!(
        ".{file_name}.tmp.{}",
        std::time::SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));

    let result = (|| -> io::Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
