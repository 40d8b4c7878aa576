//! Two-phase obsolete content collection

use super::test_utils::{zip_bytes, TestRepository};
use artifact_store::{ContentId, ContentReference, SweepScheduler};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(60);

#[test]
fn test_orphan_survives_until_timeout() {
    let t = TestRepository::with_timeouts(Duration::from_millis(200), TIMEOUT);
    let repo = &t.repository;
    let hash = repo.add_content(&b"orphan"[..]).unwrap();
    let key = hash.to_hex();
    let t0 = Instant::now();

    let first = repo.clean_obsolete_content_at(t0).unwrap();
    assert!(first.marked.contains(&key));
    assert!(first.deleted.is_empty());

    let almost = repo.clean_obsolete_content_at(t0 + TIMEOUT - Duration::from_secs(1)).unwrap();
    assert!(almost.is_empty());
    assert!(repo.has_content(&ContentId::Hash(hash)));

    let last = repo.clean_obsolete_content_at(t0 + TIMEOUT).unwrap();
    assert!(last.deleted.contains(&key));
    assert!(!repo.has_content(&ContentId::Hash(hash)));
    assert!(repo.obsolete_marks().is_empty());
}

#[test]
fn test_late_reference_rescues_marked_content() {
    let t = TestRepository::with_timeouts(Duration::from_millis(200), TIMEOUT);
    let repo = &t.repository;
    let hash = repo.add_content(&b"published before referenced"[..]).unwrap();
    let t0 = Instant::now();

    repo.clean_obsolete_content_at(t0).unwrap();
    assert!(repo.obsolete_marks().get(&hash.to_hex()).is_some());

    repo.add_content_reference(&ContentReference::for_hash("app.war", &hash));
    assert!(repo.obsolete_marks().is_empty());

    let report = repo.clean_obsolete_content_at(t0 + TIMEOUT * 2).unwrap();
    assert!(report.is_empty());
    assert!(repo.has_content(&ContentId::Hash(hash)));
}

#[test]
fn test_re_exploding_restarts_grace_window() {
    let t = TestRepository::with_timeouts(Duration::from_millis(200), TIMEOUT);
    let repo = &t.repository;
    let zip_payload = zip_bytes(&[("a.txt", b"a")]);
    let zip = repo.add_content(&zip_payload[..]).unwrap();
    let exploded = repo.explode_content(&zip).unwrap();
    let t0 = Instant::now();

    let first = repo.clean_obsolete_content_at(t0).unwrap();
    assert!(first.marked.contains(&exploded.to_hex()));

    let later = t0 + TIMEOUT * 2;
    assert_eq!(repo.add_content(&zip_payload[..]).unwrap(), zip);
    assert_eq!(repo.explode_content(&zip).unwrap(), exploded);
    assert!(repo.obsolete_marks().get(&exploded.to_hex()).is_none());

    let report = repo.clean_obsolete_content_at(later).unwrap();
    assert!(!report.deleted.contains(&exploded.to_hex()));
    assert!(repo.has_content(&ContentId::Hash(exploded)));
}

#[test]
fn test_each_orphan_gets_its_own_window() {
    let t = TestRepository::with_timeouts(Duration::from_millis(200), TIMEOUT);
    let repo = &t.repository;
    let hash = repo.add_content(&b"flapping"[..]).unwrap();
    let reference = ContentReference::for_hash("app.war", &hash);
    let t0 = Instant::now();

    repo.clean_obsolete_content_at(t0).unwrap();
    repo.add_content_reference(&reference);
    repo.clean_obsolete_content_at(t0 + Duration::from_secs(10)).unwrap();

    // Read-only removal keeps both the content and the reference.
    repo.read_only();
    repo.remove_content(&reference).unwrap();
    repo.read_write();
    assert_eq!(repo.references(&hash).len(), 1);

    // A fresh orphan from now on needs its own full window.
    let other = repo.add_content(&b"second orphan"[..]).unwrap();
    repo.clean_obsolete_content_at(t0 + TIMEOUT).unwrap();
    let report = repo.clean_obsolete_content_at(t0 + TIMEOUT + Duration::from_secs(1)).unwrap();
    assert!(report.deleted.is_empty());
    assert!(repo.has_content(&ContentId::Hash(other)));
    assert!(repo.has_content(&ContentId::Hash(hash)));
}

#[test]
fn test_read_only_sweep_is_a_no_op() {
    let t = TestRepository::with_timeouts(Duration::from_millis(200), Duration::ZERO);
    let repo = &t.repository;
    let hash = repo.add_content(&b"frozen"[..]).unwrap();

    repo.read_only();
    let now = Instant::now();
    assert!(repo.clean_obsolete_content_at(now).unwrap().is_empty());
    assert!(repo.clean_obsolete_content_at(now).unwrap().is_empty());
    assert!(repo.has_content(&ContentId::Hash(hash)));
}

#[test]
fn test_scheduler_sweeps_in_background() {
    let t = TestRepository::with_timeouts(Duration::from_millis(200), Duration::ZERO);
    let repo = Arc::new(t.repository);
    let hash = repo.add_content(&b"scheduled"[..]).unwrap();

    let scheduler = SweepScheduler::start(Arc::clone(&repo), Duration::from_millis(20)).unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while repo.has_content(&ContentId::Hash(hash)) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    scheduler.stop();

    assert!(!repo.has_content(&ContentId::Hash(hash)));
}
