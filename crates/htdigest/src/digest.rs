//! HTTP Digest "A1" hashing.
//!
//! A credential line stores `H(username:realm:password)` as lower-case hex,
//! which is what Apache's `mod_auth_digest` compares against.
//!
//! # Security Warning
//!
//! MD5 is cryptographically broken. It stays the default only because the
//! consuming web servers expect it in `htdigest` files.

use md5::Md5;
use sha2::{Digest, Sha256};
use snafu::Snafu;
use std::fmt;
use std::str::FromStr;

const MD5_HEX_LEN: usize = 32;
const SHA256_HEX_LEN: usize = 64;

/// Errors produced by the digest helpers.
#[derive(Debug, Snafu)]
pub enum Error {
    /// The algorithm name isn't one we know.
    #[snafu(display("Unknown digest algorithm: {name}"))]
    UnknownAlgorithm { name: String },

    /// A stored digest doesn't look like any supported algorithm.
    #[snafu(display("Unrecognized digest format"))]
    UnrecognizedDigest,
}

/// Hash function used for the A1 digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// MD5, the only algorithm classic `htdigest` files use.
    #[default]
    Md5,
    /// SHA-256 (RFC 7616).
    Sha256,
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            _ => UnknownAlgorithmSnafu { name: s }.fail(),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Md5 => write!(f, "md5"),
            DigestAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// Compute the hex digest of `username:realm:password`.
pub fn digest(username: &str, realm: &str, password: &str, algorithm: DigestAlgorithm) -> String {
    match algorithm {
        DigestAlgorithm::Md5 => hex_digest::<Md5>(username, realm, password),
        DigestAlgorithm::Sha256 => hex_digest::<Sha256>(username, realm, password),
    }
}

fn hex_digest<D: Digest>(username: &str, realm: &str, password: &str) -> String {
    let mut hasher = D::new();
    hasher.update(username.as_bytes());
    hasher.update(b":");
    hasher.update(realm.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Detect the algorithm a stored digest was produced with.
pub fn detect_algorithm(stored: &str) -> Option<DigestAlgorithm> {
    if !stored.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    match stored.len() {
        MD5_HEX_LEN => Some(DigestAlgorithm::Md5),
        SHA256_HEX_LEN => Some(DigestAlgorithm::Sha256),
        _ => None,
    }
}

/// Check `password` against a stored digest.
///
/// Hex case is ignored, files written by other tools sometimes use upper case.
pub fn verify(stored: &str, username: &str, realm: &str, password: &str) -> Result<bool, Error> {
    let stored = stored.trim();
    let algorithm = detect_algorithm(stored).ok_or(Error::UnrecognizedDigest)?;
    Ok(digest(username, realm, password, algorithm).eq_ignore_ascii_case(stored))
}
