//! Persisted credential store
//!
//! A key=value file under `~/.certkeeper/` holding the remote API
//! credentials and per-service file names. The file is created with mode
//! 600 on first use and only ever appended to; on read, the last
//! occurrence of a key wins.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub const REMOTE_SERVER: &str = "REMOTE_SERVER";
pub const API_TOKEN: &str = "API_TOKEN";
pub const CERT_NAME: &str = "CERT_NAME";
pub const CERT_PATH: &str = "CERT_PATH";
pub const CERT_FILE: &str = "CERT_FILE";
pub const KEY_FILE: &str = "KEY_FILE";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not determine home directory")]
    NoHome,

    #[error("invalid credential key {0:?}: keys must not contain '=' or newlines")]
    BadKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Append-only key=value credential file.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Open the store at `~/.certkeeper/credentials`.
    pub fn open_default() -> Result<Self, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::NoHome)?;
        Ok(Self::at(home.join(".certkeeper").join("credentials")))
    }

    /// Open a store at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current value of `key`, if any (last write wins).
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let mut value = None;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((k, v)) = line.split_once('=') {
                if k == key {
                    value = Some(v.to_string());
                }
            }
        }
        Ok(value)
    }

    /// Append a new value for `key`. Earlier lines are kept as history.
    pub fn append(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key.is_empty() || key.contains('=') || key.contains('\n') {
            return Err(StoreError::BadKey(key.to_string()));
        }

        self.ensure_exists()?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}={}", key, value.trim())?;
        debug!(key, path = %self.path.display(), "appended credential");
        Ok(())
    }

    /// Create the file (and its directory) with owner-only permissions.
    fn ensure_exists(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&self.path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = file.metadata()?.permissions();
            perms.set_mode(0o600);
            file.set_permissions(perms)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> CredentialStore {
        CredentialStore::at(dir.path().join("credentials"))
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store_in(&dir).get(API_TOKEN).unwrap(), None);
    }

    #[test]
    fn append_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(REMOTE_SERVER, "authority.internal").unwrap();
        assert_eq!(
            store.get(REMOTE_SERVER).unwrap().as_deref(),
            Some("authority.internal")
        );
    }

    #[test]
    fn last_write_wins_and_history_is_kept() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(CERT_NAME, "old-name").unwrap();
        store.append(CERT_NAME, "new-name").unwrap();

        assert_eq!(store.get(CERT_NAME).unwrap().as_deref(), Some("new-name"));
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("old-name"));
        assert!(raw.contains("new-name"));
    }

    #[cfg(unix)]
    #[test]
    fn file_is_created_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(API_TOKEN, "0123456789abcdefghij").unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn values_may_contain_equals() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(API_TOKEN, "abc=def==").unwrap();
        assert_eq!(store.get(API_TOKEN).unwrap().as_deref(), Some("abc=def=="));
    }

    #[test]
    fn bad_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(matches!(
            store.append("A=B", "x").unwrap_err(),
            StoreError::BadKey(_)
        ));
        assert!(matches!(
            store.append("", "x").unwrap_err(),
            StoreError::BadKey(_)
        ));
    }
}
