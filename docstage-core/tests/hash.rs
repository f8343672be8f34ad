use docstage_core::hash::ContentHasher;
use md5::{Digest, Md5};
use std::fs::write;
use tempfile::tempdir;

#[test]
fn hashing_is_deterministic() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("page.html");
    write(&path, b"<html>hello</html>").unwrap();

    let hasher = ContentHasher::default();
    assert_eq!(hasher.hash_file(&path).unwrap(), hasher.hash_file(&path).unwrap());
}

#[test]
fn single_chunk_is_a_plain_md5() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("small.txt");
    write(&path, b"abc").unwrap();

    let digest = ContentHasher::new(16).hash_file(&path).unwrap();
    assert_eq!(digest, "900150983cd24fb0d6963f7d28e17f72");
}

#[test]
fn empty_file_hashes_like_empty_input() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty");
    write(&path, b"").unwrap();

    let digest = ContentHasher::new(4).hash_file(&path).unwrap();
    assert_eq!(digest, "d41d8cd98f00b204e9800998ecf8427e");
}

#[test]
fn multiple_chunks_follow_the_multipart_etag_convention() {
    let data = b"0123456789abcdefghij";
    let hasher = ContentHasher::new(8);

    let mut concatenated = Vec::new();
    for chunk in data.chunks(8) {
        concatenated.extend_from_slice(&Md5::digest(chunk));
    }
    let expected = format!("{}-3", hex::encode(Md5::digest(&concatenated)));

    assert_eq!(hasher.hash_bytes(data), expected);
}

#[test]
fn file_and_buffer_hashes_agree_across_chunk_boundaries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blob.bin");
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    write(&path, &data).unwrap();

    for chunk_size in [1000, 1024, 4096, 10_000, 20_000] {
        let hasher = ContentHasher::new(chunk_size);
        assert_eq!(
            hasher.hash_file(&path).unwrap(),
            hasher.hash_bytes(&data),
            "chunk size {chunk_size}"
        );
    }
}

#[test]
fn exact_multiple_of_chunk_size_has_no_trailing_empty_chunk() {
    let data = vec![7u8; 16];
    let digest = ContentHasher::new(8).hash_bytes(&data);
    assert!(digest.ends_with("-2"), "{digest}");
}
