//! Digest determinism for byte streams and directory trees

use artifact_store::tree::hasher::{digest_path, digest_reader};
use proptest::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn build_tree(root: &Path, files: &[(&str, &str)]) {
    for (relative, content) in files {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

#[test]
fn test_same_tree_same_digest_regardless_of_location() {
    let temp_dir = TempDir::new().unwrap();
    let files = [("a.txt", "alpha"), ("dir/b.txt", "beta"), ("dir/sub/c.txt", "gamma")];
    let first = temp_dir.path().join("one").join("content");
    let second = temp_dir.path().join("two").join("content");
    build_tree(&first, &files);
    build_tree(&second, &files);

    assert_eq!(digest_path(&first).unwrap(), digest_path(&second).unwrap());
}

#[test]
fn test_creation_order_does_not_matter() {
    let temp_dir = TempDir::new().unwrap();
    let first = temp_dir.path().join("x").join("content");
    let second = temp_dir.path().join("y").join("content");
    build_tree(&first, &[("z.txt", "z"), ("a.txt", "a"), ("m/n.txt", "n")]);
    build_tree(&second, &[("m/n.txt", "n"), ("a.txt", "a"), ("z.txt", "z")]);

    assert_eq!(digest_path(&first).unwrap(), digest_path(&second).unwrap());
}

#[test]
fn test_rename_changes_digest() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("content");
    build_tree(&root, &[("a.txt", "same")]);
    let before = digest_path(&root).unwrap();

    fs::rename(root.join("a.txt"), root.join("b.txt")).unwrap();
    assert_ne!(digest_path(&root).unwrap(), before);
}

#[test]
fn test_content_change_changes_digest() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("content");
    build_tree(&root, &[("a.txt", "one")]);
    let before = digest_path(&root).unwrap();

    fs::write(root.join("a.txt"), "two").unwrap();
    assert_ne!(digest_path(&root).unwrap(), before);
}

#[test]
fn test_empty_directory_is_part_of_digest() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("content");
    build_tree(&root, &[("a.txt", "a")]);
    let before = digest_path(&root).unwrap();

    fs::create_dir(root.join("empty")).unwrap();
    assert_ne!(digest_path(&root).unwrap(), before);
}

#[test]
fn test_file_path_digest_includes_name() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("named.txt");
    fs::write(&file, "bytes").unwrap();

    let by_path = digest_path(&file).unwrap();
    let by_stream = digest_reader(&b"bytes"[..]).unwrap();
    assert_ne!(by_path, by_stream);
    assert_eq!(by_stream.as_bytes(), blake3::hash(b"bytes").as_bytes());
}

proptest! {
    #[test]
    fn prop_stream_digest_is_deterministic(bytes in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let first = digest_reader(&bytes[..]).unwrap();
        let second = digest_reader(&bytes[..]).unwrap();
        let expected = blake3::hash(&bytes);
        prop_assert_eq!(first, second);
        prop_assert_eq!(first.as_bytes(), expected.as_bytes());
    }

    #[test]
    fn prop_tree_digest_is_deterministic(
        files in proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9 ]{0,64}", 1..8)
    ) {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("a").join("content");
        let second = temp_dir.path().join("b").join("content");
        for root in [&first, &second] {
            fs::create_dir_all(root).unwrap();
            for (name, content) in &files {
                fs::write(root.join(name), content).unwrap();
            }
        }
        prop_assert_eq!(digest_path(&first).unwrap(), digest_path(&second).unwrap());
    }
}
