//! Caller-supplied paths never leave the content tree

use super::test_utils::{zip_bytes, TestRepository};
use artifact_store::tree::path::resolve_securely;
use artifact_store::{AcceptAll, ExplodedContent, RepositoryError, StorageError};
use std::path::Path;
use tempfile::TempDir;

fn is_escape<T>(result: &Result<T, RepositoryError>) -> bool {
    matches!(
        result,
        Err(RepositoryError::StorageError(StorageError::PathEscape { .. }))
    )
}

#[test]
fn test_resolver_normalizes_and_rejects() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    assert_eq!(resolve_securely(root, "a/b/../c").unwrap(), root.join("a").join("c"));
    assert!(resolve_securely(root, "../../etc/passwd").is_err());
    assert!(resolve_securely(root, "a/../../x").is_err());
    assert!(resolve_securely(root, "/etc/passwd").is_err());
    assert_eq!(resolve_securely(root, "").unwrap(), Path::new(root));
}

#[test]
fn test_operations_reject_traversal() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let zip = repo.add_content(&zip_bytes(&[("a.txt", b"a")])[..]).unwrap();
    let exploded = repo.explode_content(&zip).unwrap();
    let outside = t.temp_dir.path().join("escaped");

    assert!(is_escape(&repo.add_content_to_exploded(
        &exploded,
        vec![ExplodedContent::from_bytes("../../../escaped", "x")],
        true,
    )));
    assert!(!outside.exists());

    assert!(is_escape(&repo.remove_content_from_exploded(
        &exploded,
        &["../a.txt".to_string()]
    )));
    assert!(is_escape(&repo.read_content(&exploded, "../../etc/passwd")));
    assert!(is_escape(&repo.list_content(&exploded, "../..", &AcceptAll)));
    assert!(is_escape(&repo.explode_sub_content(&exploded, "/etc/passwd")));
}

#[test]
fn test_archive_with_escaping_entry_is_refused() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let evil = repo
        .add_content(&zip_bytes(&[("ok.txt", b"ok"), ("../../evil.txt", b"x")])[..])
        .unwrap();

    assert!(is_escape(&repo.explode_content(&evil)));
    assert!(!t.temp_dir.path().join("evil.txt").exists());
    assert_eq!(repo.store().list_hashes().unwrap(), vec![evil]);
}

#[cfg(unix)]
#[test]
fn test_symlink_out_of_tree_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("root");
    let outside = temp_dir.path().join("outside");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::create_dir_all(&outside).unwrap();
    std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

    assert!(resolve_securely(&root, "link/new-file").is_err());
    std::fs::write(outside.join("secret"), "s").unwrap();
    assert!(resolve_securely(&root, "link/secret").is_err());
    assert!(resolve_securely(&root, "inside/new-file").is_ok());
}
