//! Streaming SHA-256 over persisted files.
//!
//! The ledger store keeps pack archives and run artifacts on disk; these are
//! re-hashed during verification without loading them whole.

use crate::error::{Result, ResultExt as _};
use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Buffer size for streaming reads (8 KB).
const BUFFER_SIZE: usize = 8192;

/// Hash everything readable from `reader`.
///
/// # Errors
///
/// Returns error if a read fails.
pub fn hash_reader<R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(buffer.get(..bytes_read).unwrap_or_default());
    }

    let hash = hasher.finalize();
    Ok(format!("{hash:x}"))
}

/// Compute the SHA-256 of a file as lowercase hex.
///
/// # Errors
///
/// Returns error if the file cannot be opened or read.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    hash_reader(BufReader::with_capacity(BUFFER_SIZE, file))
        .with_context(|| format!("Failed to read file: {}", path.display()))
}
