//! Error types for the local hash catalog.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised while loading or persisting the hash catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Failed to read a catalog file.
    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write or sync a catalog file.
    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// `hashlist.dat` contains a record that cannot be decoded.
    #[error("Corrupt hash list {path} at line {line_number}: {reason}")]
    CorruptCatalog {
        path: PathBuf,
        line_number: usize,
        reason: String,
    },

    /// `hashlist.ver` is missing, unreadable, or names another format version.
    #[error(
        "Incompatible hash list version in {path}: found {}, expected {expected}",
        .found.as_deref().unwrap_or("none")
    )]
    IncompatibleCatalogVersion {
        path: PathBuf,
        found: Option<String>,
        expected: u32,
    },

    /// A hash containing whitespace or control characters cannot be recorded.
    #[error("Cannot record hash {hash:?} for {path}")]
    InvalidHash { path: String, hash: String },

    /// A path recorded in the catalog cannot be placed inside the install directory.
    #[error("Refusing to touch unsafe catalog path {0:?}")]
    UnsafePath(String),
}

impl CatalogError {
    /// Whether the on-disk state is unusable and may be reset by the caller.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            CatalogError::CorruptCatalog { .. } | CatalogError::IncompatibleCatalogVersion { .. }
        )
    }
}
