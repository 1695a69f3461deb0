//! Content fingerprinting.
//!
//! SHA-256 fingerprints identify media items and fetched archives
//! independently of their names, so re-processing the same bytes is
//! idempotent and a re-acquired archive with different content is
//! detectable.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

const BUFFER_SIZE: usize = 64 * 1024;

/// Streams a file through SHA-256 and returns the lowercase hex digest.
pub async fn file_fingerprint(path: &Path) -> std::io::Result<String> {
    let file = File::open(path).await?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprints an in-memory byte slice.
pub fn bytes_fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
