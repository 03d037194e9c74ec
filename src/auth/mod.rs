//! Persisted credential storage.
//!
//! The store is a small key-value document holding `username` and `token`.
//! It is read once at startup and cleared entirely on logout.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Credential;

/// Load/save boundary for the credential that outlives the process.
pub trait CredentialStore: Send + Sync {
    /// Returns a credential only when both fields are present and non-empty.
    fn load(&self) -> Result<Option<Credential>>;
    fn save(&self, credential: &Credential) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCredential {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

impl StoredCredential {
    fn into_credential(self) -> Option<Credential> {
        let credential = Credential {
            username: self.username?,
            token: self.token?,
        };
        credential.is_complete().then_some(credential)
    }
}

/// JSON file store, written through a temp file and rename.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = self
            .path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("credentials.json");
        let now_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_nanos())
            .unwrap_or(0);
        parent.join(format!(".{}.{}.tmp", file_name, now_nanos))
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AppError::Storage(format!(
                    "failed reading credentials {}: {}",
                    self.path.display(),
                    err
                )));
            }
        };

        let stored: StoredCredential = serde_json::from_str(&raw).map_err(|err| {
            AppError::Storage(format!(
                "failed parsing credentials {}: {}",
                self.path.display(),
                err
            ))
        })?;

        Ok(stored.into_credential())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let stored = StoredCredential {
            username: Some(credential.username.clone()),
            token: Some(credential.token.clone()),
        };
        let encoded =
            serde_json::to_vec(&stored).map_err(|err| AppError::Storage(err.to_string()))?;

        let temp_path = self.temp_path();
        fs::write(&temp_path, encoded)?;
        if let Err(err) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(AppError::Storage(format!(
                "failed writing credentials {}: {}",
                self.path.display(),
                err
            )));
        }

        tracing::debug!(path = %self.path.display(), "Credentials saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::Storage(format!(
                "failed deleting credentials {}: {}",
                self.path.display(),
                err
            ))),
        }
    }
}

/// In-process store for headless runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            inner: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| AppError::Storage("credential store poisoned".to_string()))?;
        Ok(guard.clone().filter(Credential::is_complete))
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| AppError::Storage("credential store poisoned".to_string()))?;
        *guard = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| AppError::Storage("credential store poisoned".to_string()))?;
        *guard = None;
        Ok(())
    }
}
