//! Content hashing compatible with S3 ETags.
//!
//! Files are hashed in fixed-size chunks. A single chunk hashes to the plain
//! MD5 hex digest; more than one chunk hashes to
//! `md5(md5(chunk_1) || … || md5(chunk_n)) + "-" + n`, which is the ETag S3
//! assigns to a multipart upload with that part size. Local and remote
//! hashes can therefore be compared without downloading anything.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use md5::{Digest, Md5};

/// Default multipart threshold and part size (8 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentHasher {
    chunk_size: usize,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ContentHasher {
    /// A zero chunk size is bumped to one byte.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Hash the file at `path`.
    pub fn hash_file(&self, path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut buffer = vec![0u8; self.chunk_size];
        let mut digests: Vec<u8> = Vec::new();
        let mut chunks = 0usize;

        loop {
            let filled = fill_chunk(&mut file, &mut buffer)?;
            if filled == 0 && chunks > 0 {
                break;
            }
            digests.extend_from_slice(&Md5::digest(&buffer[..filled]));
            chunks += 1;
            if filled < buffer.len() {
                break;
            }
        }

        Ok(finish(&digests, chunks))
    }

    /// Hash an in-memory buffer with the same chunking as [`hash_file`](Self::hash_file).
    pub fn hash_bytes(&self, data: &[u8]) -> String {
        if data.is_empty() {
            return hex::encode(Md5::digest(data));
        }
        let mut digests: Vec<u8> = Vec::new();
        let mut chunks = 0usize;
        for chunk in data.chunks(self.chunk_size) {
            digests.extend_from_slice(&Md5::digest(chunk));
            chunks += 1;
        }
        finish(&digests, chunks)
    }
}

fn finish(digests: &[u8], chunks: usize) -> String {
    if chunks <= 1 {
        return hex::encode(digests);
    }
    format!("{}-{}", hex::encode(Md5::digest(digests)), chunks)
}

/// Read until `buffer` is full or the reader is exhausted.
fn fill_chunk(reader: &mut impl Read, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
