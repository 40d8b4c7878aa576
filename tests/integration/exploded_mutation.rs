//! Exploding and mutating stored trees

use super::test_utils::{write_zip, zip_bytes, TestRepository};
use artifact_store::tree::hasher::digest_path;
use artifact_store::{
    AcceptAll, ContentEntry, ContentId, DepthArchiveFilter, ExplodedContent, RepositoryError,
};
use std::fs;
use std::io::Read;

#[test]
fn test_explode_zip_lists_entry_with_uncompressed_size() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let zip = repo.add_content(&zip_bytes(&[("a.txt", b"hello")])[..]).unwrap();

    let exploded = repo.explode_content(&zip).unwrap();
    assert_ne!(exploded, zip);

    let entries = repo.list_content(&exploded, "", &AcceptAll).unwrap();
    assert_eq!(
        entries,
        vec![ContentEntry {
            path: "a.txt".to_string(),
            is_directory: false,
            size: 5,
        }]
    );
}

#[test]
fn test_explode_is_deterministic() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let zip = repo
        .add_content(&zip_bytes(&[("b.txt", b"b"), ("a/c.txt", b"c")])[..])
        .unwrap();

    let first = repo.explode_content(&zip).unwrap();
    let second = repo.explode_content(&zip).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_mutations_never_touch_the_original() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let zip = repo
        .add_content(&zip_bytes(&[("index.html", b"<html/>"), ("WEB-INF/web.xml", b"<web/>")])[..])
        .unwrap();
    let exploded = repo.explode_content(&zip).unwrap();
    let original = repo.content_path(&ContentId::Hash(exploded)).unwrap();
    let before = digest_path(&original).unwrap();

    let added = repo
        .add_content_to_exploded(
            &exploded,
            vec![ExplodedContent::from_bytes("WEB-INF/classes/app.properties", "k=v")],
            false,
        )
        .unwrap();
    let removed = repo
        .remove_content_from_exploded(&exploded, &["WEB-INF/web.xml".to_string()])
        .unwrap();

    assert_eq!(digest_path(&original).unwrap(), before);
    assert_ne!(added, exploded);
    assert_ne!(removed, exploded);
    assert_ne!(added, removed);

    let removed_path = repo.content_path(&ContentId::Hash(removed)).unwrap();
    assert!(!removed_path.join("WEB-INF").exists());
    assert!(removed_path.join("index.html").exists());
}

#[test]
fn test_add_then_remove_returns_to_original_digest() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let zip = repo.add_content(&zip_bytes(&[("a.txt", b"a")])[..]).unwrap();
    let exploded = repo.explode_content(&zip).unwrap();

    let added = repo
        .add_content_to_exploded(&exploded, vec![ExplodedContent::from_bytes("extra/b.txt", "b")], false)
        .unwrap();
    let back = repo
        .remove_content_from_exploded(&added, &["extra/b.txt".to_string()])
        .unwrap();
    assert_eq!(back, exploded);
}

#[test]
fn test_operations_on_wrong_content_kind() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let plain = repo.add_content(&b"not an archive"[..]).unwrap();

    assert!(matches!(
        repo.explode_content(&plain),
        Err(RepositoryError::NotAnArchive(_))
    ));
    assert!(matches!(
        repo.add_content_to_exploded(&plain, vec![ExplodedContent::directory("x")], false),
        Err(RepositoryError::NotExploded(_))
    ));
    assert!(matches!(
        repo.remove_content_from_exploded(&plain, &["x".to_string()]),
        Err(RepositoryError::NotExploded(_))
    ));
}

#[test]
fn test_explode_nested_archive_in_place() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let jar = zip_bytes(&[("com/example/Main.class", b"\xca\xfe\xba\xbe")]);
    let war = repo
        .add_content(&zip_bytes(&[("WEB-INF/lib/app.jar", &jar[..]), ("index.html", b"<html/>")])[..])
        .unwrap();
    let exploded = repo.explode_content(&war).unwrap();

    let archives = repo
        .list_content(&exploded, "", &DepthArchiveFilter::archives_only())
        .unwrap();
    assert_eq!(archives.len(), 1);
    assert_eq!(archives[0].path, "WEB-INF/lib/app.jar");

    let deeper = repo.explode_sub_content(&exploded, "WEB-INF/lib/app.jar").unwrap();
    let listing = repo.list_content(&deeper, "WEB-INF/lib/app.jar", &AcceptAll).unwrap();
    let paths: Vec<_> = listing.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["com/", "com/example/", "com/example/Main.class"]);

    assert!(matches!(
        repo.explode_sub_content(&exploded, "WEB-INF/lib/missing.jar"),
        Err(RepositoryError::ArchiveNotFound(_))
    ));
}

#[test]
fn test_read_content_through_archives() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let jar = zip_bytes(&[("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0")]);
    let war = repo
        .add_content(&zip_bytes(&[("WEB-INF/lib/app.jar", &jar[..])])[..])
        .unwrap();
    let exploded = repo.explode_content(&war).unwrap();

    for hash in [war, exploded] {
        let mut stream = repo
            .read_content(&hash, "WEB-INF/lib/app.jar/META-INF/MANIFEST.MF")
            .unwrap();
        let mut text = String::new();
        stream.read_to_string(&mut text).unwrap();
        assert_eq!(text, "Manifest-Version: 1.0");
        assert_eq!(stream.content_type(), "text/plain");
    }

    assert!(matches!(
        repo.read_content(&exploded, "WEB-INF/lib/app.jar/META-INF/missing"),
        Err(RepositoryError::ContentNotFound(_))
    ));
    assert!(matches!(
        repo.read_content(&exploded, "WEB-INF/lib"),
        Err(RepositoryError::NotAFile(_))
    ));
}

#[test]
fn test_copy_exploded_content_out() {
    let t = TestRepository::new();
    let repo = &t.repository;
    let archive = t.temp_dir.path().join("app.zip");
    write_zip(&archive, &[("conf/app.conf", b"port=8080")]);
    let zip = repo.add_content(fs::File::open(&archive).unwrap()).unwrap();
    let exploded = repo.explode_content(&zip).unwrap();

    let target = t.temp_dir.path().join("deployed");
    repo.copy_exploded_content(&exploded, &target).unwrap();
    assert_eq!(fs::read(target.join("conf/app.conf")).unwrap(), b"port=8080");

    assert!(matches!(
        repo.copy_exploded_content(&zip, &t.temp_dir.path().join("nope")),
        Err(RepositoryError::NotExploded(_))
    ));
}
