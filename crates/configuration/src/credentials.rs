use crate::error::ConfigError;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use core_types::Credential;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where the session engine reads and writes the user credential.
///
/// The engine loads once at startup and saves whenever it generates a new
/// credential.
pub trait CredentialStore {
    fn load(&self) -> Result<Credential, ConfigError>;
    fn save(&mut self, credential: &Credential) -> Result<(), ConfigError>;
}

/// On-disk layout. User and password are base64 so the file is not plain text
/// at a glance; this is not encryption.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCredential {
    #[serde(default)]
    user: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    auto_login: bool,
}

/// A JSON file credential store.
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

    /// Forgets the stored credential so the next run registers a new user.
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        self.save(&Credential::default())
    }
}

fn decode_field(name: &str, value: &str) -> Result<String, ConfigError> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|e| ConfigError::Credentials(format!("{name}: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ConfigError::Credentials(format!("{name}: {e}")))
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Credential, ConfigError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No stored credential.");
            return Ok(Credential::default());
        }

        let text = fs::read_to_string(&self.path)?;
        let stored: StoredCredential = serde_json::from_str(&text)
            .map_err(|e| ConfigError::Credentials(e.to_string()))?;

        Ok(Credential {
            user: decode_field("user", &stored.user)?,
            password: decode_field("password", &stored.password)?,
            auto_login: stored.auto_login,
        })
    }

    fn save(&mut self, credential: &Credential) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let stored = StoredCredential {
            user: STANDARD.encode(credential.user.as_bytes()),
            password: STANDARD.encode(credential.password.as_bytes()),
            auto_login: credential.auto_login,
        };
        let text = serde_json::to_string_pretty(&stored)
            .map_err(|e| ConfigError::Credentials(e.to_string()))?;
        fs::write(&self.path, text)?;

        tracing::debug!(path = %self.path.display(), "Credential saved.");
        Ok(())
    }
}

/// Keeps the credential in memory only. Used for throwaway sessions and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    credential: Credential,
    saves: usize,
}

impl MemoryCredentialStore {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            saves: 0,
        }
    }

    pub fn current(&self) -> &Credential {
        &self.credential
    }

    /// How many times `save` has been called.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Credential, ConfigError> {
        Ok(self.credential.clone())
    }

    fn save(&mut self, credential: &Credential) -> Result<(), ConfigError> {
        self.credential = credential.clone();
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("klinewatch-test-{}", rand::random::<u64>()))
            .join("credentials.json")
    }

    #[test]
    fn missing_file_loads_as_empty_credential() {
        let store = FileCredentialStore::new(scratch_path());
        let credential = store.load().unwrap();
        assert!(credential.is_empty());
    }

    #[test]
    fn saved_credential_loads_back() {
        let path = scratch_path();
        let mut store = FileCredentialStore::new(&path);
        let credential = Credential::new("alice", "p@ss", true);
        store.save(&credential).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("alice"));
        assert_eq!(store.load().unwrap(), credential);

        store.reset().unwrap();
        assert!(store.load().unwrap().is_empty());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn corrupt_base64_is_reported() {
        let path = scratch_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"user":"***","password":"","auto_login":false}"#).unwrap();

        let err = FileCredentialStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ConfigError::Credentials(_)));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn memory_store_counts_saves() {
        let mut store = MemoryCredentialStore::default();
        store.save(&Credential::new("u", "p", false)).unwrap();
        assert_eq!(store.saves(), 1);
        assert_eq!(store.current().user, "u");
    }
}
