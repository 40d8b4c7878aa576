//! Concurrent callers against one repository

use super::test_utils::{zip_bytes, TestRepository};
use artifact_store::{ContentId, ContentReference, ExplodedContent};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_parallel_identical_adds_deduplicate() {
    let t = TestRepository::new();
    let repo = Arc::new(t.repository);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let repo = Arc::clone(&repo);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                repo.add_content(&b"contended bytes"[..]).unwrap()
            })
        })
        .collect();
    let hashes: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(hashes.len(), 1);
    assert_eq!(repo.store().list_hashes().unwrap().len(), 1);
}

#[test]
fn test_parallel_mutations_of_one_tree() {
    let t = TestRepository::with_timeouts(Duration::from_secs(10), Duration::from_secs(60));
    let repo = Arc::new(t.repository);
    let zip = repo.add_content(&zip_bytes(&[("base.txt", b"base")])[..]).unwrap();
    let exploded = repo.explode_content(&zip).unwrap();

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                repo.add_content_to_exploded(
                    &exploded,
                    vec![ExplodedContent::from_bytes(format!("added/{}.txt", i), format!("{}", i))],
                    false,
                )
                .unwrap()
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let distinct: HashSet<_> = results.iter().collect();
    assert_eq!(distinct.len(), 6);
    let original = repo.content_path(&ContentId::Hash(exploded)).unwrap();
    assert!(!original.join("added").exists());
    for (i, hash) in results.iter().enumerate() {
        let path = repo.content_path(&ContentId::Hash(*hash)).unwrap();
        assert!(path.join(format!("added/{}.txt", i)).exists());
        assert!(path.join("base.txt").exists());
    }
}

#[test]
fn test_reference_churn_keeps_count_consistent() {
    let t = TestRepository::new();
    let repo = Arc::new(t.repository);
    let hash = repo.add_content(&b"churn"[..]).unwrap();
    let anchor = ContentReference::for_hash("anchor", &hash);
    repo.add_content_reference(&anchor);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                for round in 0..50 {
                    let reference = ContentReference::for_hash(format!("w{}-{}", worker, round), &hash);
                    repo.add_content_reference(&reference);
                    repo.remove_content(&reference).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(repo.references(&hash), vec![anchor.clone()]);
    assert!(repo.has_content(&ContentId::Hash(hash)));
    repo.remove_content(&anchor).unwrap();
    assert!(!repo.has_content(&ContentId::Hash(hash)));
}
