use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read users file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid users file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("credential backend unavailable: {0}")]
    Unavailable(String),
}

/// Username to password lookup and insertion.
///
/// Implementations must be safe to call from every worker at once.
/// `insert` is a single atomic check-and-insert: it returns `Ok(false)`
/// without touching the stored password when the username already exists,
/// so concurrent identical registrations produce exactly one entry.
pub trait CredentialStore: Send + Sync {
    fn lookup(&self, username: &str) -> Result<Option<String>, StoreError>;

    fn insert(&self, username: &str, password: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Default, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: HashMap<String, String>,
}

/// In-memory store; one mutex guards the whole map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users<I, K, V>(users: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let users = users
            .into_iter()
            .map(|(name, password)| (name.into(), password.into()))
            .collect();
        Self {
            users: Mutex::new(users),
        }
    }

    /// Preloads users from a YAML file shaped like
    ///
    /// ```yaml
    /// users:
    ///   jin: "123456"
    /// ```
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: UsersFile = serde_yaml::from_str(&text).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), users = file.users.len(), "loaded users");
        Ok(Self {
            users: Mutex::new(file.users),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryStore {
    fn lookup(&self, username: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(username).cloned())
    }

    fn insert(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        let mut users = self.lock();
        if users.contains_key(username) {
            return Ok(false);
        }
        users.insert(username.to_string(), password.to_string());
        Ok(true)
    }
}
