//! Durable credential record persistence
//!
//! One JSON file per identity under a configurable base directory. The
//! directory is shared by every instance of the process family, so a
//! record written by one instance is immediately visible to the others.
//!
//! Writes go through a temp-file-then-rename sequence so that a reader
//! never observes a partially written record: the new content is fully
//! on disk before it becomes visible under the final name.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::auth::record::CredentialRecord;
use crate::error::AuthError;

/// File-per-identity credential record store.
///
/// All methods take `&self`; the store itself holds no mutable state and
/// is safe to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Creates a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] when the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| AuthError::Storage(format!("cannot create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    /// Base directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads the record for `identity`.
    ///
    /// A missing file is `Ok(None)`; a file that exists but cannot be read
    /// or parsed is an error, not an absence.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] on read or parse failure.
    pub fn load(&self, identity: &str) -> Result<Option<CredentialRecord>, AuthError> {
        let path = self.record_path(identity);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuthError::Storage(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };

        let record: CredentialRecord = serde_json::from_str(&contents).map_err(|e| {
            AuthError::Storage(format!("corrupt credential record {}: {e}", path.display()))
        })?;
        debug!(identity, "loaded credential record");
        Ok(Some(record))
    }

    /// Persists `record`, replacing any previous record for the identity.
    ///
    /// The record is written to a temp file in the same directory, given
    /// owner-only permissions, then renamed over the final path so readers
    /// see either the old record or the new one, never a torn write.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] on any I/O or serialization failure.
    pub fn save(&self, record: &CredentialRecord) -> Result<(), AuthError> {
        let path = self.record_path(&record.identity);
        let tmp_path = path.with_extension("json.tmp");

        let contents = serde_json::to_string_pretty(record)
            .map_err(|e| AuthError::Storage(format!("cannot serialize record: {e}")))?;

        std::fs::write(&tmp_path, &contents).map_err(|e| {
            AuthError::Storage(format!("cannot write {}: {e}", tmp_path.display()))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
            {
                warn!("cannot set permissions on {}: {e}", tmp_path.display());
            }
        }

        std::fs::rename(&tmp_path, &path).map_err(|e| {
            AuthError::Storage(format!(
                "cannot publish {} -> {}: {e}",
                tmp_path.display(),
                path.display()
            ))
        })?;

        debug!(identity = %record.identity, "saved credential record");
        Ok(())
    }

    /// Deletes the record for `identity`.
    ///
    /// Returns `true` when a record existed and was removed, `false` when
    /// there was nothing to delete.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] on I/O failure other than absence.
    pub fn delete(&self, identity: &str) -> Result<bool, AuthError> {
        let path = self.record_path(identity);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(identity, "deleted credential record");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AuthError::Storage(format!(
                "cannot delete {}: {e}",
                path.display()
            ))),
        }
    }

    /// Lists identities that have a stored record, in sorted order.
    ///
    /// Files that do not parse as records are skipped with a warning so
    /// one corrupt file cannot take down enumeration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] when the directory cannot be read.
    pub fn list_identities(&self) -> Result<Vec<String>, AuthError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            AuthError::Storage(format!("cannot list {}: {e}", self.dir.display()))
        })?;

        let mut identities = BTreeSet::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| AuthError::Storage(format!("cannot read directory entry: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<CredentialRecord>(&c).ok())
            {
                Some(record) => {
                    identities.insert(record.identity);
                }
                None => warn!("skipping unreadable credential file {}", path.display()),
            }
        }
        Ok(identities.into_iter().collect())
    }

    /// Path of the record file for `identity`.
    ///
    /// Identities are user-supplied strings (typically email addresses);
    /// anything outside `[A-Za-z0-9._-]` is replaced so an identity can
    /// never escape the store directory.
    fn record_path(&self, identity: &str) -> PathBuf {
        let safe: String = identity
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn sample_record(identity: &str) -> CredentialRecord {
        CredentialRecord {
            identity: identity.to_string(),
            access_token: "access_123".to_string(),
            refresh_token: Some("refresh_456".to_string()),
            granted_scopes: BTreeSet::from([
                "https://www.googleapis.com/auth/spreadsheets".to_string(),
            ]),
            expires_at: Some(DateTime::from_timestamp(1_800_000_000, 0).expect("valid timestamp")),
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path()).expect("store");

        let record = sample_record("alice@example.com");
        store.save(&record).expect("save");

        let loaded = store
            .load("alice@example.com")
            .expect("load")
            .expect("record present");
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path()).expect("store");
        assert!(store.load("nobody@example.com").expect("load").is_none());
    }

    #[test]
    fn test_load_corrupt_file_is_error_not_absence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path()).expect("store");
        std::fs::write(dir.path().join("alice_example.com.json"), "{not json")
            .expect("write corrupt file");

        let err = store.load("alice@example.com").unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
    }

    #[test]
    fn test_save_replaces_existing_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path()).expect("store");

        let mut record = sample_record("alice@example.com");
        store.save(&record).expect("save first");

        record.access_token = "access_new".to_string();
        store.save(&record).expect("save second");

        let loaded = store
            .load("alice@example.com")
            .expect("load")
            .expect("record present");
        assert_eq!(loaded.access_token, "access_new");
    }

    #[test]
    fn test_save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path()).expect("store");
        store.save(&sample_record("alice@example.com")).expect("save");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_record_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path()).expect("store");
        store.save(&sample_record("alice@example.com")).expect("save");

        let path = dir.path().join("alice_example.com.json");
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_delete_existing_and_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path()).expect("store");
        store.save(&sample_record("alice@example.com")).expect("save");

        assert!(store.delete("alice@example.com").expect("delete"));
        assert!(!store.delete("alice@example.com").expect("second delete"));
        assert!(store.load("alice@example.com").expect("load").is_none());
    }

    #[test]
    fn test_list_identities_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path()).expect("store");
        store.save(&sample_record("zed@example.com")).expect("save");
        store.save(&sample_record("alice@example.com")).expect("save");

        let identities = store.list_identities().expect("list");
        assert_eq!(
            identities,
            vec!["alice@example.com".to_string(), "zed@example.com".to_string()],
        );
    }

    #[test]
    fn test_list_identities_skips_corrupt_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path()).expect("store");
        store.save(&sample_record("alice@example.com")).expect("save");
        std::fs::write(dir.path().join("garbage.json"), "oops").expect("write garbage");

        let identities = store.list_identities().expect("list");
        assert_eq!(identities, vec!["alice@example.com".to_string()]);
    }

    #[test]
    fn test_identity_with_path_characters_stays_in_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path()).expect("store");

        let record = sample_record("../../etc/passwd");
        store.save(&record).expect("save");

        // The record is retrievable and nothing was written outside the dir.
        let loaded = store
            .load("../../etc/passwd")
            .expect("load")
            .expect("record present");
        assert_eq!(loaded.identity, "../../etc/passwd");

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(files.len(), 1);
    }
}
