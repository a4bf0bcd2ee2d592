//! Desired-state helpers for configuration management tools.
//!
//! A reconciler polls [`CredentialStore::exists`] and only mutates the file
//! when the observed state differs from what it wants. [`CredentialStore::ensure`]
//! packages that loop for a single user.

use crate::store::{CredentialStore, Error};
use tracing::debug;

/// The state a user's credential should end up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensure<'a> {
    /// The user should have an entry, created with this password if missing.
    Present {
        /// Plaintext password used when the entry has to be created.
        password: &'a str,
    },
    /// The user should have no entry.
    Absent,
}

/// What [`CredentialStore::ensure`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new entry was appended.
    Created,
    /// Existing entries were removed.
    Removed,
    /// The file already matched.
    Unchanged,
}

impl CredentialStore {
    /// Converge `username` in `realm` towards `desired`.
    ///
    /// An existing entry is never rewritten for `Present`, even if its
    /// password differs. A missing file already satisfies `Absent`.
    pub fn ensure(&self, username: &str, realm: &str, desired: Ensure<'_>) -> Result<Outcome, Error> {
        let exists = self.exists(username, realm)?;
        let outcome = match (desired, exists) {
            (Ensure::Present { password }, false) => {
                self.add(username, realm, password)?;
                Outcome::Created
            }
            (Ensure::Absent, true) => {
                self.remove(username, realm)?;
                Outcome::Removed
            }
            _ => Outcome::Unchanged,
        };
        debug!(username, realm, ?outcome, "ensured credential state");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ErrorKind;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_present_then_absent() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("wiki")).unwrap();
        let store = CredentialStore::new(dir.path());
        let present = Ensure::Present { password: "pw" };

        assert_eq!(store.ensure("alice", "wiki", present).unwrap(), Outcome::Created);
        assert_eq!(store.ensure("alice", "wiki", present).unwrap(), Outcome::Unchanged);
        assert_eq!(store.list_users("wiki").unwrap(), vec!["alice"]);

        assert_eq!(store.ensure("alice", "wiki", Ensure::Absent).unwrap(), Outcome::Removed);
        assert_eq!(store.ensure("alice", "wiki", Ensure::Absent).unwrap(), Outcome::Unchanged);
        assert!(!store.exists("alice", "wiki").unwrap());
    }

    #[test]
    fn test_ensure_absent_without_file() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        assert_eq!(store.ensure("alice", "wiki", Ensure::Absent).unwrap(), Outcome::Unchanged);
    }

    #[test]
    fn test_ensure_present_keeps_existing_password() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("wiki")).unwrap();
        let store = CredentialStore::new(dir.path());
        store.add("alice", "wiki", "old").unwrap();

        let outcome = store
            .ensure("alice", "wiki", Ensure::Present { password: "new" })
            .unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert!(store.verify("alice", "wiki", "old").unwrap());
    }

    #[test]
    fn test_ensure_propagates_validation() {
        let store = CredentialStore::new("/nonexistent");
        let err = store.ensure("a:b", "wiki", Ensure::Absent).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
