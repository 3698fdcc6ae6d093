//! Session persistence
//!
//! Provides:
//! - On-disk session storage (`session_<username>` + `session.json` sidecar)
//! - Optional encryption of the session blob
//! - File-based session locking to prevent parallel execution

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crypto::SessionEncryption;
use crate::error::{Error, Result};

pub const METADATA_FILE: &str = "session.json";
pub const LOCK_FILE: &str = "session.lock";

/// Cookies that make up an authenticated web session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub username: Option<String>,
    pub cookies: BTreeMap<String, String>,
}

impl SessionData {
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn set_cookie<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn session_id(&self) -> Option<&str> {
        self.cookie("sessionid").filter(|v| !v.is_empty())
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.cookie("csrftoken")
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_id().is_some()
    }

    /// `Cookie` header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Contents of the `session.json` sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub username: String,
    pub timestamp: DateTime<Local>,
    #[serde(default)]
    pub encrypted: bool,
}

/// Stores one session at a time in `dir`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    encrypt: bool,
}

impl SessionStore {
    /// Create the store, making `dir` with 0700 permissions.
    pub fn new<P: AsRef<Path>>(dir: P, encrypt: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        restrict_permissions(&dir, 0o700);
        Ok(Self { dir, encrypt })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn encrypts(&self) -> bool {
        self.encrypt
    }

    pub fn session_file(&self, username: &str) -> PathBuf {
        self.dir.join(format!("session_{}", username))
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Persist `data` for `username`. The blob is encrypted when the store
    /// encrypts and `encryption` is given.
    pub fn save(
        &self,
        username: &str,
        data: &SessionData,
        encryption: Option<&SessionEncryption>,
    ) -> Result<PathBuf> {
        let session_path = self.session_file(username);
        let plain = serde_json::to_vec(data)?;

        let encrypted = match (self.encrypt, encryption) {
            (true, Some(enc)) => {
                fs::write(&session_path, enc.encrypt(&plain)?)?;
                true
            }
            _ => {
                fs::write(&session_path, &plain)?;
                false
            }
        };
        restrict_permissions(&session_path, 0o600);

        let metadata = SessionMetadata {
            username: username.to_string(),
            timestamp: Local::now(),
            encrypted,
        };
        let metadata_path = self.metadata_file();
        fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;
        restrict_permissions(&metadata_path, 0o600);

        info!(
            "Session saved for {} ({})",
            username,
            if encrypted { "encrypted" } else { "plain" }
        );
        Ok(session_path)
    }

    /// Read the sidecar, if present and well-formed.
    pub fn metadata(&self) -> Option<SessionMetadata> {
        let path = self.metadata_file();
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<SessionMetadata>(&content) {
            Ok(meta) if !meta.username.is_empty() => Some(meta),
            Ok(_) => {
                warn!("Session metadata has no username");
                None
            }
            Err(e) => {
                warn!("Unreadable session metadata {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Load the saved session. Encrypted sessions are decrypted with
    /// `encryption`, or with the fallback key when none is given. A session
    /// that cannot be decrypted counts as absent.
    pub fn load(&self, encryption: Option<&SessionEncryption>) -> Option<(String, SessionData)> {
        let Some(meta) = self.metadata() else {
            debug!("No session metadata in {}", self.dir.display());
            return None;
        };

        let session_path = self.session_file(&meta.username);
        let raw = match fs::read(&session_path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("No session file for {}", meta.username);
                return None;
            }
        };

        let plain = if meta.encrypted {
            let fallback;
            let enc = match encryption {
                Some(enc) => enc,
                None => {
                    fallback = SessionEncryption::new(None);
                    &fallback
                }
            };
            let token = String::from_utf8_lossy(&raw);
            match enc.decrypt(&token) {
                Ok(plain) => plain,
                Err(e) => {
                    warn!("Cannot decrypt session for {}: {}", meta.username, e);
                    return None;
                }
            }
        } else {
            raw
        };

        match serde_json::from_slice::<SessionData>(&plain) {
            Ok(mut data) => {
                data.username.get_or_insert_with(|| meta.username.clone());
                info!("Loaded session for {}", meta.username);
                Some((meta.username, data))
            }
            Err(e) => {
                warn!("Corrupt session file for {}: {}", meta.username, e);
                None
            }
        }
    }

    /// Delete the sidecar and the session file of `username` (or of whoever
    /// the sidecar names).
    pub fn remove(&self, username: Option<&str>) -> Result<()> {
        let owner = username
            .map(str::to_string)
            .or_else(|| self.metadata().map(|m| m.username));

        let metadata_path = self.metadata_file();
        if metadata_path.exists() {
            fs::remove_file(&metadata_path)?;
            info!("Removed session metadata");
        }

        if let Some(owner) = owner {
            let session_path = self.session_file(&owner);
            if session_path.exists() {
                fs::remove_file(&session_path)?;
                info!("Removed session file for {}", owner);
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        warn!("Cannot change permissions of {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) {}

/// Lock guard that ensures exclusive access to the session directory.
pub struct SessionLock {
    lock_file: Option<File>,
    path: PathBuf,
}

impl SessionLock {
    /// Acquire an exclusive lock in `dir`.
    pub fn acquire<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .map_err(|e| Error::LockError(format!("Failed to create {}: {}", dir.display(), e)))?;
        let path = dir.join(LOCK_FILE);

        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::LockError(format!("Failed to open lock file: {}", e)))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                lock_file: Some(lock_file),
                path,
            }),
            Err(_) => {
                eprintln!(
                    r#"
⚠️  The session is already in use by another ig_downloader process.

Running two downloads on one account at the same time doubles the request
rate and is the fastest way to get rate limited. Wait for the other process
to finish and try again.
"#
                );
                Err(Error::SessionLocked)
            }
        }
    }

    /// Release the lock manually
    pub fn release(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = file.unlock();
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        self.release();
    }
}
