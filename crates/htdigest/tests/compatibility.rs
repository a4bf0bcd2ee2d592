//! Apache htdigest file compatibility tests
//!
//! These tests check that files written by Apache's `htdigest` tool are read
//! and rewritten correctly, and that concurrent writers don't lose entries.

use htdigest::{CredentialStore, DigestAlgorithm, ErrorKind, digest};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

/// Output of `htdigest -c .htpasswd testrealm@host.com Mufasa` with the
/// password `Circle Of Life`.
const APACHE_LINE: &str = "Mufasa:testrealm@host.com:939e7578ed9e3c518a452acee763bce9";

fn create_test_dir(realms: &[&str]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for realm in realms {
        fs::create_dir(dir.path().join(realm)).expect("Failed to create realm dir");
    }
    dir
}

fn realm_file(dir: &Path, realm: &str) -> std::path::PathBuf {
    dir.join(realm).join(".htpasswd")
}

#[test]
fn test_apache_file_read() {
    let dir = create_test_dir(&["testrealm@host.com"]);
    let path = realm_file(dir.path(), "testrealm@host.com");
    fs::write(&path, format!("{APACHE_LINE}\n")).unwrap();

    let store = CredentialStore::new(dir.path());
    assert!(store.exists("Mufasa", "testrealm@host.com").unwrap());
    assert!(
        store
            .verify("Mufasa", "testrealm@host.com", "Circle Of Life")
            .unwrap()
    );
    assert!(!store.verify("Mufasa", "testrealm@host.com", "wrong").unwrap());
    assert_eq!(
        store.list_users("testrealm@host.com").unwrap(),
        vec!["Mufasa"]
    );
}

#[test]
fn test_written_line_matches_apache() {
    let dir = create_test_dir(&["testrealm@host.com"]);
    let store = CredentialStore::new(dir.path());
    store
        .add("Mufasa", "testrealm@host.com", "Circle Of Life")
        .unwrap();

    let content = fs::read_to_string(realm_file(dir.path(), "testrealm@host.com")).unwrap();
    assert_eq!(content, format!("{APACHE_LINE}\n"));
}

#[test]
fn test_add_then_remove_scenario() {
    let dir = create_test_dir(&["wiki"]);
    let path = realm_file(dir.path(), "wiki");
    fs::write(&path, "alice:wiki:abc123\nbob:wiki:def456\n").unwrap();

    let store = CredentialStore::new(dir.path());
    store.remove("alice", "wiki").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "bob:wiki:def456\n");

    store.add("alice", "wiki", "pw").unwrap();
    assert!(store.exists("alice", "wiki").unwrap());
    store.remove("alice", "wiki").unwrap();
    assert!(!store.exists("alice", "wiki").unwrap());
    assert_eq!(fs::read_to_string(&path).unwrap(), "bob:wiki:def456\n");
}

#[test]
fn test_realms_are_separate_files() {
    let dir = create_test_dir(&["wiki", "dev"]);
    let store = CredentialStore::new(dir.path());
    store.add("alice", "wiki", "pw").unwrap();

    assert!(store.exists("alice", "wiki").unwrap());
    assert!(!store.exists("alice", "dev").unwrap());
    assert_eq!(
        store.remove("alice", "dev").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn test_crlf_file_keeps_foreign_lines() {
    let dir = create_test_dir(&["wiki"]);
    let path = realm_file(dir.path(), "wiki");
    fs::write(&path, "alice:wiki:abc123\r\nbob:wiki:def456\r\n").unwrap();

    let store = CredentialStore::new(dir.path());
    assert!(store.exists("bob", "wiki").unwrap());
    store.remove("alice", "wiki").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "bob:wiki:def456\r\n");
}

#[test]
fn test_concurrent_writers_keep_every_entry() {
    let dir = create_test_dir(&["wiki"]);
    let store = Arc::new(CredentialStore::new(dir.path()));
    store.add("ghost", "wiki", "boo").unwrap();

    let mut handles = Vec::new();
    for worker in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for n in 0..20 {
                store
                    .add(&format!("user{worker}-{n}"), "wiki", "pw")
                    .unwrap();
            }
        }));
    }
    {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for _ in 0..20 {
                store.remove("ghost", "wiki").unwrap();
                store.add("ghost", "wiki", "boo").unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let users = store.list_users("wiki").unwrap();
    assert_eq!(users.len(), 4 * 20 + 1);
    for worker in 0..4 {
        for n in 0..20 {
            assert!(store.exists(&format!("user{worker}-{n}"), "wiki").unwrap());
        }
    }
    let content = fs::read_to_string(realm_file(dir.path(), "wiki")).unwrap();
    assert_eq!(content.lines().count(), 4 * 20 + 1);
    assert!(content.ends_with('\n'));
}

#[test]
fn test_digest_matches_store_output() {
    let dir = create_test_dir(&["dev"]);
    let store = CredentialStore::new(dir.path());
    store.add("carol", "dev", "secret").unwrap();

    let content = fs::read_to_string(realm_file(dir.path(), "dev")).unwrap();
    assert_eq!(
        content,
        format!(
            "carol:dev:{}\n",
            digest("carol", "dev", "secret", DigestAlgorithm::Md5)
        )
    );
}
