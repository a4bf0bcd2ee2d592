use snafu::{Snafu, ensure};
use std::fmt;

/// Characters that would break the `username:realm:digest` line format.
const FORBIDDEN: [char; 3] = [':', '\n', '\r'];

/// Errors produced while validating identifiers.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum Error {
    /// Username cannot be empty.
    #[snafu(display("Username cannot be empty"))]
    UsernameEmpty,

    /// Username contains a delimiter or line break.
    #[snafu(display("Username '{}' contains invalid character {:?}", username.escape_debug(), character))]
    UsernameInvalidCharacter { username: String, character: char },

    /// Realm cannot be empty.
    #[snafu(display("Realm cannot be empty"))]
    RealmEmpty,

    /// Realm contains a delimiter or line break.
    #[snafu(display("Realm '{}' contains invalid character {:?}", realm.escape_debug(), character))]
    RealmInvalidCharacter { realm: String, character: char },

    /// Realm can't be used as a single directory name.
    #[snafu(display("Realm '{}' is not a valid path segment", realm.escape_debug()))]
    RealmInvalidPathSegment { realm: String },
}

/// Check that a username can be written into a credential line.
pub fn validate_username(username: &str) -> Result<(), Error> {
    ensure!(!username.is_empty(), UsernameEmptySnafu);
    if let Some(character) = username.chars().find(|c| FORBIDDEN.contains(c)) {
        return UsernameInvalidCharacterSnafu {
            username,
            character,
        }
        .fail();
    }
    Ok(())
}

/// Check that a realm can be written into a credential line and used as the
/// directory name holding its credential file.
pub fn validate_realm(realm: &str) -> Result<(), Error> {
    ensure!(!realm.is_empty(), RealmEmptySnafu);
    if let Some(character) = realm.chars().find(|c| FORBIDDEN.contains(c)) {
        return RealmInvalidCharacterSnafu { realm, character }.fail();
    }
    ensure!(
        realm != "." && realm != ".." && !realm.contains(['/', '\\', '\0']),
        RealmInvalidPathSegmentSnafu { realm }
    );
    Ok(())
}

/// The prefix every line belonging to `username` in `realm` starts with.
pub(crate) fn identity_prefix(username: &str, realm: &str) -> String {
    format!("{username}:{realm}:")
}

/// A single `username:realm:digest` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialEntry {
    /// Name of the user.
    pub username: String,
    /// Authentication realm.
    pub realm: String,
    /// Hex-encoded digest of `username:realm:password`.
    pub digest: String,
}

impl CredentialEntry {
    /// Parse one line of a credential file.
    ///
    /// Returns `None` for anything that isn't a well-formed entry: comments,
    /// blank lines and lines with fewer than three fields are opaque and
    /// callers must leave them alone.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        let (username, rest) = line.split_once(':')?;
        let (realm, digest) = rest.split_once(':')?;
        if username.is_empty() || realm.is_empty() || digest.is_empty() || digest.contains(':') {
            return None;
        }
        Some(Self {
            username: username.to_string(),
            realm: realm.to_string(),
            digest: digest.to_string(),
        })
    }

    /// Whether this entry belongs to `username` in `realm`.
    pub fn matches(&self, username: &str, realm: &str) -> bool {
        self.username == username && self.realm == realm
    }
}

impl fmt::Display for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.username, self.realm, self.digest)
    }
}
