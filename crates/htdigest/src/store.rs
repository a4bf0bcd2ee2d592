use crate::digest::{self, DigestAlgorithm};
use crate::entry::{self, CredentialEntry, identity_prefix};
use crate::lock::RealmLock;
use snafu::{OptionExt, ResultExt, Snafu};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
#[cfg(unix)]
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Name of the credential file inside each realm directory.
pub const DEFAULT_FILE_NAME: &str = ".htpasswd";

/// Errors that can occur during credential file operations.
#[derive(Debug, Snafu)]
pub enum Error {
    /// Username or realm can't be stored.
    #[snafu(display("Invalid credential identifier"))]
    Validation { source: entry::Error },

    /// The realm's credential file doesn't exist.
    #[snafu(display("Credential file '{}' does not exist", path.display()))]
    RealmFileNotFound { path: PathBuf },

    /// No entry for the user in the realm.
    #[snafu(display("User '{username}' not found in realm '{realm}'"))]
    UserNotFound { username: String, realm: String },

    /// Failed to open the credential file.
    #[snafu(display("Failed to open credential file '{}'", path.display()))]
    FileOpen {
        source: io::Error,
        path: PathBuf,
    },

    /// Failed to read from the credential file.
    #[snafu(display("Failed to read credential file '{}'", path.display()))]
    FileRead {
        source: io::Error,
        path: PathBuf,
    },

    /// Failed to write to the credential file.
    #[snafu(display("Failed to write credential file '{}'", path.display()))]
    FileWrite {
        source: io::Error,
        path: PathBuf,
    },

    /// Failed to lock the credential file.
    #[snafu(display("Failed to lock credential file '{}'", path.display()))]
    Lock {
        source: io::Error,
        path: PathBuf,
    },

    /// Failed to prepare the replacement file.
    #[snafu(display("Failed to write temporary file in '{}'", path.display()))]
    TempFile {
        source: io::Error,
        path: PathBuf,
    },

    /// Failed to move the replacement over the credential file.
    #[snafu(display("Failed to replace credential file '{}'", path.display()))]
    Persist {
        source: tempfile::PersistError,
        path: PathBuf,
    },

    /// Failed to verify a stored digest.
    #[snafu(display("Failed to verify password"))]
    Verify { source: digest::Error },
}

/// Broad classification of [`Error`] for callers deciding what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed username or realm.
    Validation,
    /// The credential file or the user is missing.
    NotFound,
    /// The underlying storage failed.
    Storage,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::RealmFileNotFound { .. } | Error::UserNotFound { .. } => ErrorKind::NotFound,
            Error::FileOpen { .. }
            | Error::FileRead { .. }
            | Error::FileWrite { .. }
            | Error::Lock { .. }
            | Error::TempFile { .. }
            | Error::Persist { .. }
            | Error::Verify { .. } => ErrorKind::Storage,
        }
    }
}

/// Per-realm digest credential files under a common root.
///
/// Realm `wiki` lives in `<root>/wiki/.htpasswd`. Nothing is cached: every
/// call opens the file, does its work and closes it again.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
    file_name: String,
    algorithm: DigestAlgorithm,
}

impl CredentialStore {
    /// Create a store rooted at `root`, using MD5 digests.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            algorithm: DigestAlgorithm::default(),
        }
    }

    /// Use `algorithm` for newly written digests.
    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Use `file_name` instead of `.htpasswd` inside each realm directory.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Root directory holding one directory per realm.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Algorithm used for newly written digests.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Location of the credential file for `realm`.
    pub fn realm_path(&self, realm: &str) -> Result<PathBuf, Error> {
        entry::validate_realm(realm).context(ValidationSnafu)?;
        Ok(self.root.join(realm).join(&self.file_name))
    }

    fn identity_path(&self, username: &str, realm: &str) -> Result<PathBuf, Error> {
        entry::validate_username(username).context(ValidationSnafu)?;
        self.realm_path(realm)
    }

    fn entry_line(&self, username: &str, realm: &str, password: &str) -> String {
        CredentialEntry {
            username: username.to_string(),
            realm: realm.to_string(),
            digest: digest::digest(username, realm, password, self.algorithm),
        }
        .to_string()
    }

    /// Append a credential line for `username` in `realm`.
    ///
    /// The file is created if it doesn't exist yet, its directory is not.
    /// An existing entry for the same user is left in place, so calling this
    /// twice produces two lines; use [`CredentialStore::set`] to replace.
    pub fn add(&self, username: &str, realm: &str, password: &str) -> Result<(), Error> {
        let path = self.identity_path(username, realm)?;
        let line = self.entry_line(username, realm, password);

        let _lock = RealmLock::acquire(&path).context(LockSnafu { path: &path })?;
        if file_contains(&path, &identity_prefix(username, realm))? {
            warn!(username, realm, "appending duplicate credential entry");
        }
        append_line(&path, &line)?;

        info!(username, realm, path = %path.display(), "added credential");
        Ok(())
    }

    /// Remove every credential line for `username` in `realm`.
    ///
    /// Fails with [`Error::RealmFileNotFound`] when the realm has no file.
    /// Removing a user that has no line succeeds and leaves the file as is.
    /// Returns the number of removed lines.
    pub fn remove(&self, username: &str, realm: &str) -> Result<usize, Error> {
        let path = self.identity_path(username, realm)?;
        ensure_file_exists(&path)?;

        let _lock = RealmLock::acquire(&path).context(LockSnafu { path: &path })?;
        let content = read_existing(&path)?;
        let (kept, removed) = without_identity(&content, &identity_prefix(username, realm));
        if removed == 0 {
            debug!(username, realm, "no credential to remove");
            return Ok(0);
        }
        replace_contents(&path, &kept)?;

        info!(username, realm, removed, path = %path.display(), "removed credential");
        Ok(removed)
    }

    /// Whether `realm` has at least one credential line for `username`.
    ///
    /// A missing file means no entries and yields `false`.
    pub fn exists(&self, username: &str, realm: &str) -> Result<bool, Error> {
        let path = self.identity_path(username, realm)?;
        file_contains(&path, &identity_prefix(username, realm))
    }

    /// Replace all credential lines for `username` in `realm` with a single
    /// fresh one, creating the file if needed.
    pub fn set(&self, username: &str, realm: &str, password: &str) -> Result<(), Error> {
        let path = self.identity_path(username, realm)?;
        let line = self.entry_line(username, realm, password);

        let _lock = RealmLock::acquire(&path).context(LockSnafu { path: &path })?;
        match fs::read(&path) {
            Ok(content) => {
                let (mut kept, removed) =
                    without_identity(&content, &identity_prefix(username, realm));
                if !kept.is_empty() && !kept.ends_with(b"\n") {
                    kept.push(b'\n');
                }
                kept.extend_from_slice(line.as_bytes());
                kept.push(b'\n');
                replace_contents(&path, &kept)?;
                info!(username, realm, replaced = removed, path = %path.display(), "set credential");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                append_line(&path, &line)?;
                info!(username, realm, path = %path.display(), "added credential");
            }
            Err(e) => return Err(e).context(FileReadSnafu { path: &path }),
        }
        Ok(())
    }

    /// Check `password` against the first credential line for `username`.
    pub fn verify(&self, username: &str, realm: &str, password: &str) -> Result<bool, Error> {
        let path = self.identity_path(username, realm)?;
        let content = read_existing(&path)?;
        let entry = String::from_utf8_lossy(&content)
            .lines()
            .filter_map(CredentialEntry::parse)
            .find(|entry| entry.matches(username, realm))
            .context(UserNotFoundSnafu { username, realm })?;

        digest::verify(&entry.digest, username, realm, password).context(VerifySnafu)
    }

    /// Sorted usernames with at least one entry in `realm`.
    ///
    /// A missing file yields an empty list.
    pub fn list_users(&self, realm: &str) -> Result<Vec<String>, Error> {
        let path = self.realm_path(realm)?;
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context(FileReadSnafu { path: &path }),
        };

        let users: BTreeSet<String> = String::from_utf8_lossy(&content)
            .lines()
            .filter_map(CredentialEntry::parse)
            .filter(|entry| entry.realm == realm)
            .map(|entry| entry.username)
            .collect();
        Ok(users.into_iter().collect())
    }
}

fn ensure_file_exists(path: &Path) -> Result<(), Error> {
    match fs::metadata(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => RealmFileNotFoundSnafu { path }.fail(),
        Err(e) => Err(e).context(FileOpenSnafu { path }),
    }
}

fn read_existing(path: &Path) -> Result<Vec<u8>, Error> {
    match fs::read(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => RealmFileNotFoundSnafu { path }.fail(),
        Err(e) => Err(e).context(FileReadSnafu { path }),
    }
}

/// Stream `path` looking for a line starting with `prefix`.
fn file_contains(path: &Path, prefix: &str) -> Result<bool, Error> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "credential file does not exist");
            return Ok(false);
        }
        Err(e) => return Err(e).context(FileOpenSnafu { path }),
    };

    for line in BufReader::new(file).split(b'\n') {
        let line = line.context(FileReadSnafu { path })?;
        if line.starts_with(prefix.as_bytes()) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Drop every line starting with `prefix`, keeping all other bytes as they
/// were. Returns the remaining content and the number of dropped lines.
fn without_identity(content: &[u8], prefix: &str) -> (Vec<u8>, usize) {
    let mut kept = Vec::with_capacity(content.len());
    let mut removed = 0;
    for line in content.split_inclusive(|b| *b == b'\n') {
        if line.starts_with(prefix.as_bytes()) {
            removed += 1;
        } else {
            kept.extend_from_slice(line);
        }
    }
    (kept, removed)
}

fn append_line(path: &Path, line: &str) -> Result<(), Error> {
    let mut options = OpenOptions::new();
    options.read(true).append(true).create(true);
    // Only applies when the file is created.
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).context(FileOpenSnafu { path })?;

    let mut record = Vec::with_capacity(line.len() + 2);
    if !ends_with_newline(&mut file).context(FileReadSnafu { path })? {
        record.push(b'\n');
    }
    record.extend_from_slice(line.as_bytes());
    record.push(b'\n');

    file.write_all(&record).context(FileWriteSnafu { path })?;
    file.sync_all().context(FileWriteSnafu { path })?;
    Ok(())
}

/// Empty files count as ending with a newline.
fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Write `content` to a temporary file next to the file `path` refers to and
/// rename it over that file.
///
/// Symlinks are followed so the link keeps pointing at the updated file.
/// Until the rename commits, the original is untouched.
fn replace_contents(path: &Path, content: &[u8]) -> Result<(), Error> {
    let target = fs::canonicalize(path).context(FileReadSnafu { path })?;
    let dir = target
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    write_replacement(&target, dir, content)
}

/// Stage `content` in `dir` and rename it over `target`, carrying over the
/// mode, owner and group of `target`.
fn write_replacement(target: &Path, dir: &Path, content: &[u8]) -> Result<(), Error> {
    let metadata = fs::metadata(target).context(FileReadSnafu { path: target })?;

    let mut temp = NamedTempFile::new_in(dir).context(TempFileSnafu { path: dir })?;
    temp.write_all(content).context(TempFileSnafu { path: dir })?;
    #[cfg(unix)]
    copy_ownership(temp.as_file(), &metadata).context(TempFileSnafu { path: dir })?;
    fs::set_permissions(temp.path(), metadata.permissions())
        .context(TempFileSnafu { path: dir })?;
    temp.as_file()
        .sync_all()
        .context(TempFileSnafu { path: dir })?;

    temp.persist(target).context(PersistSnafu { path: target })?;
    debug!(path = %target.display(), bytes = content.len(), "replaced credential file");
    Ok(())
}

/// Give the replacement the owner and group of the original, e.g. a
/// `root:www-data` file the web server reads through its group.
#[cfg(unix)]
fn copy_ownership(temp: &File, original: &fs::Metadata) -> io::Result<()> {
    let current = temp.metadata()?;
    if current.uid() == original.uid() && current.gid() == original.gid() {
        return Ok(());
    }
    std::os::unix::fs::fchown(temp, Some(original.uid()), Some(original.gid()))
}
