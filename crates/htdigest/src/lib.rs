#![warn(missing_docs)]

//! Maintain Apache `htdigest`-style credential files, one per realm.
//!
//! Each realm owns `<root>/<realm>/.htpasswd`, a plain text file of
//! `username:realm:digest` lines where the digest is the hex-encoded
//! HTTP Digest "A1" hash of `username:realm:password`.
//!
//! # Example
//!
//! ```no_run
//! use htdigest::CredentialStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = CredentialStore::new("/var/lib/trac/auth");
//!
//! // Append a credential line
//! store.add("alice", "wiki", "password123")?;
//!
//! if store.exists("alice", "wiki")? {
//!     println!("alice can log in to wiki");
//! }
//!
//! // Drop every line for alice in wiki
//! store.remove("alice", "wiki")?;
//! # Ok(())
//! # }
//! ```

mod digest;
mod ensure;
mod entry;
mod lock;
mod store;

pub use digest::{
    DigestAlgorithm, Error as DigestError, detect_algorithm, digest, verify as verify_digest,
};
pub use ensure::{Ensure, Outcome};
pub use entry::{CredentialEntry, Error as ValidationError, validate_realm, validate_username};
pub use lock::RealmLock;
pub use store::{CredentialStore, DEFAULT_FILE_NAME, Error, ErrorKind};
