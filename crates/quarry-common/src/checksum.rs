//! Checksum utilities for Quarry
//!
//! Provides xxHash64 calculation over in-memory buffers and streamed
//! file contents for data integrity verification.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read buffer size for streamed file hashing
const HASH_BUF_SIZE: usize = 64 * 1024;

/// Compute the xxHash64 of a byte slice
#[inline]
#[must_use]
pub fn xxhash64(data: &[u8]) -> u64 {
    xxhash_rust::xxh64::xxh64(data, 0)
}

/// Verify a byte slice against an expected xxHash64
#[inline]
#[must_use]
pub fn verify_xxhash64(data: &[u8], expected: u64) -> bool {
    xxhash64(data) == expected
}

/// Compute the xxHash64 of a file's contents without loading it whole
pub fn xxhash64_file(path: impl AsRef<Path>) -> std::io::Result<u64> {
    let mut file = File::open(path)?;
    let mut hasher = xxhash_rust::xxh64::Xxh64::new(0);
    let mut buf = vec![0u8; HASH_BUF_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.digest())
}
