//! Types for the archive source module.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// An archive advertised by the source, not yet fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteArchive {
    /// Source identifier (remote file id or path).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Size in bytes as reported by the source.
    pub size_bytes: u64,
}

/// A fetched archive on local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedArchive {
    /// Where the bytes landed.
    pub path: PathBuf,
    /// SHA-256 of the fetched bytes.
    pub fingerprint: String,
    /// Actual size on disk.
    pub size_bytes: u64,
}
