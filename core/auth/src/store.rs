//! File-backed credential cache.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use drivekit_common::{Error, Result};

use crate::token::CredentialRecord;

/// Default token file name, relative to the working directory.
pub const DEFAULT_TOKEN_FILE: &str = "token.json";

/// Persists one [`CredentialRecord`] as JSON at a fixed path.
///
/// The file is replaced atomically and is readable by the owner only.
/// Nothing coordinates two processes sharing the same path: each may
/// refresh and overwrite the other's write.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Create a token store at a specific path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached credential.
    ///
    /// # Errors
    /// - `Error::CredentialMissing` if the file is absent or unparsable
    pub fn load(&self) -> Result<CredentialRecord> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) => {
                debug!(path = %self.path.display(), "No cached credential: {}", e);
                return Err(Error::CredentialMissing(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        serde_json::from_slice(&data).map_err(|e| {
            warn!(path = %self.path.display(), "Ignoring unparsable token file: {}", e);
            Error::CredentialMissing(format!("{}: {}", self.path.display(), e))
        })
    }

    /// Atomically replace the token file with `record`.
    ///
    /// # Errors
    /// - `Error::Persistence` if any step of the write fails
    pub fn save(&self, record: &CredentialRecord) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.persistence_error(e))?;

        let json = serde_json::to_vec_pretty(record).map_err(|e| self.persistence_error(e))?;

        // NamedTempFile is created 0600 on Unix; the rename keeps that mode.
        let mut file = NamedTempFile::new_in(&dir).map_err(|e| self.persistence_error(e))?;
        file.write_all(&json)
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| self.persistence_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.persistence_error(e))?;
        }

        file.persist(&self.path)
            .map_err(|e| self.persistence_error(e.error))?;

        info!("Saved credential file to {}", self.path.display());
        Ok(())
    }

    /// Remove the token file. A missing file is not an error.
    pub fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed credential file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.persistence_error(e)),
        }
    }

    fn persistence_error(&self, e: impl std::fmt::Display) -> Error {
        Error::Persistence(format!(
            "Unable to cache OAuth token at {}: {}",
            self.path.display(),
            e
        ))
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use drivekit_common::Secret;
    use tempfile::TempDir;

    fn sample_record() -> CredentialRecord {
        CredentialRecord::new(
            "a1",
            Some(Secret::new("r1")),
            Some(Utc::now() + Duration::hours(1)),
        )
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));
        let record = sample_record();

        store.save(&record).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, record);
    }

    #[test]
    fn test_roundtrip_preserves_optional_fields() {
        let zero: DateTime<Utc> = "0001-01-01T00:00:00Z".parse().unwrap();
        let mut mac = CredentialRecord::new("a5", Some(Secret::new("r5")), None);
        mac.token_type = "MAC".to_string();

        let records = [
            CredentialRecord::new("a1", None, Some(Utc::now() + Duration::hours(1))),
            CredentialRecord::new("a2", Some(Secret::new("r2")), None),
            CredentialRecord::new("a3", None, None),
            CredentialRecord::new("a4", Some(Secret::new("r4")), Some(zero)),
            mac,
        ];

        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));
        for record in records {
            store.save(&record).unwrap();
            assert_eq!(store.load().unwrap(), record);
        }
    }

    #[test]
    fn test_save_replaces_previous_record() {
        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));

        store.save(&sample_record()).unwrap();
        let newer = CredentialRecord::new("a2", None, None);
        store.save(&newer).unwrap();

        assert_eq!(store.load().unwrap(), newer);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));

        assert!(matches!(store.load(), Err(Error::CredentialMissing(_))));
    }

    #[test]
    fn test_load_unparsable_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        std::fs::write(&path, b"{\"access_token\": 42").unwrap();

        let store = TokenStore::new(path);
        assert!(matches!(store.load(), Err(Error::CredentialMissing(_))));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("nested/dir/token.json"));

        store.save(&sample_record()).unwrap();
        assert!(store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));
        store.save(&sample_record()).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_save_failure_is_surfaced() {
        let temp = TempDir::new().unwrap();
        // A directory where the file should be makes the final rename fail.
        let path = temp.path().join("token.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupant"), b"x").unwrap();

        let store = TokenStore::new(path);
        assert!(matches!(
            store.save(&sample_record()),
            Err(Error::Persistence(_))
        ));
    }

    #[test]
    fn test_delete() {
        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));

        store.delete().unwrap();

        store.save(&sample_record()).unwrap();
        store.delete().unwrap();
        assert!(matches!(store.load(), Err(Error::CredentialMissing(_))));
    }
}
