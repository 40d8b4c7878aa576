//! Publish, reference and remove content through the repository

use super::test_utils::TestRepository;
use artifact_store::{ContentHash, ContentId, ContentReference};
use std::fs;
use std::time::{Duration, Instant};

#[test]
fn test_hello_lifecycle() {
    let t = TestRepository::new();
    let repo = &t.repository;

    let hash = repo.add_content(&b"hello"[..]).unwrap();
    let expected = ContentHash::from_bytes(*blake3::hash(b"hello").as_bytes());
    assert_eq!(hash, expected);

    let hex = hash.to_hex();
    let path = repo.content_path(&ContentId::Hash(hash)).unwrap();
    assert!(path.ends_with(format!("{}/{}/content", &hex[..2], &hex[2..])));

    let reference = ContentReference::for_hash("hello.txt", &hash);
    repo.add_content_reference(&reference);

    // Referenced content is never marked or deleted, however long we wait.
    let now = Instant::now();
    assert!(repo.clean_obsolete_content_at(now).unwrap().is_empty());
    assert!(repo
        .clean_obsolete_content_at(now + Duration::from_secs(3600))
        .unwrap()
        .is_empty());
    assert!(repo.has_content(&ContentId::Hash(hash)));

    repo.remove_content(&reference).unwrap();
    assert!(!repo.has_content(&ContentId::Hash(hash)));
    assert!(!path.exists());
    assert!(!path.parent().unwrap().exists());
}

#[test]
fn test_duplicate_adds_store_one_copy() {
    let t = TestRepository::new();
    let repo = &t.repository;

    let first = repo.add_content(&b"same bytes"[..]).unwrap();
    let second = repo.add_content(&b"same bytes"[..]).unwrap();
    assert_eq!(first, second);
    assert_eq!(repo.store().list_hashes().unwrap(), vec![first]);
    assert_eq!(fs::read_dir(repo.store().scratch_root()).unwrap().count(), 0);
}

#[test]
fn test_content_lives_while_any_reference_remains() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let hash = repo.add_content(&b"deployment"[..]).unwrap();
    let id = ContentId::Hash(hash);

    let refs: Vec<_> = ["a.war", "b.war", "c.war"]
        .iter()
        .map(|name| ContentReference::for_hash(*name, &hash))
        .collect();
    for r in &refs {
        repo.add_content_reference(r);
    }
    // Adding the same reference twice changes nothing.
    repo.add_content_reference(&refs[0]);
    assert_eq!(repo.references(&hash).len(), 3);

    repo.remove_content(&refs[0]).unwrap();
    repo.remove_content(&refs[1]).unwrap();
    assert!(repo.has_content(&id));

    repo.remove_content(&refs[2]).unwrap();
    assert!(!repo.has_content(&id));
    assert!(repo.references(&hash).is_empty());
}

#[test]
fn test_remove_without_any_reference_deletes() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let hash = repo.add_content(&b"never referenced"[..]).unwrap();

    repo.remove_content(&ContentReference::for_hash("ghost", &hash)).unwrap();
    assert!(!repo.has_content(&ContentId::Hash(hash)));
}

#[test]
fn test_uppercase_reference_hash_matches() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let hash = repo.add_content(&b"case"[..]).unwrap();

    let upper = ContentReference::new("app", hash.to_hex().to_uppercase());
    repo.add_content_reference(&upper);
    assert_eq!(repo.references(&hash).len(), 1);
    assert!(repo.has_content(&ContentId::parse(&hash.to_hex().to_uppercase())));
}

#[test]
fn test_legacy_identifiers_are_opaque_paths() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let legacy = t.temp_dir.path().join("deployments").join("legacy.ear");
    fs::create_dir_all(legacy.parent().unwrap()).unwrap();
    fs::write(&legacy, "pre-digest content").unwrap();

    let id = ContentId::parse(&legacy.to_string_lossy());
    assert!(matches!(id, ContentId::Legacy(_)));
    assert!(repo.has_content(&id));
    assert_eq!(repo.content_path(&id).unwrap(), legacy);

    // Legacy paths are never picked up by the sweep.
    let now = Instant::now();
    repo.clean_obsolete_content_at(now).unwrap();
    repo.clean_obsolete_content_at(now + Duration::from_secs(3600)).unwrap();
    assert!(legacy.exists());
}
