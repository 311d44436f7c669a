//! Error types for applying downloaded files.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::CatalogError;

/// Result type for patch operations.
pub type PatchResult<T> = Result<T, PatchError>;

/// Failure to install or remove one file.
///
/// Whenever one of these is returned the previous file (if any) and its
/// catalog entry are left as they were.
#[derive(Debug, Error)]
pub enum PatchError {
    /// Writing, syncing or renaming the staged file failed.
    #[error("Failed to patch {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The received byte count differs from the declared size.
    #[error("Failed to patch {path}: expected {expected} bytes, received {actual}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// The SHA-256 of the received bytes differs from the manifest hash.
    #[error("Failed to patch {path}: content digest {actual} does not match {expected}")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// The relative path would leave the install directory.
    #[error("Failed to patch {path}: path escapes the install directory")]
    UnsafePath { path: String },

    /// Removing a stale file failed.
    #[error("Failed to remove {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file was placed but its hash could not be recorded.
    #[error("Failed to record {path} in hash list: {source}")]
    Catalog {
        path: String,
        #[source]
        source: CatalogError,
    },
}
