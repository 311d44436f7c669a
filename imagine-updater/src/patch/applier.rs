//! Atomic installation of downloaded files.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::{PatchError, PatchResult};
use super::staged::{StagedFile, STAGING_PREFIX, STAGING_SUFFIX};
use crate::catalog::HashCatalog;
use crate::manifest::resolve_in;

/// Installs files under an install directory and records them in the catalog.
///
/// Files are staged as temporary files in the destination directory and
/// renamed over the destination on commit, so a reader never observes a
/// half-written file under its final name.
#[derive(Debug, Clone)]
pub struct PatchApplier {
    install_dir: PathBuf,
    catalog: Arc<Mutex<HashCatalog>>,
    verify_digests: bool,
}

impl PatchApplier {
    pub fn new(install_dir: impl Into<PathBuf>, catalog: Arc<Mutex<HashCatalog>>) -> Self {
        Self {
            install_dir: install_dir.into(),
            catalog,
            verify_digests: false,
        }
    }

    /// Require the SHA-256 of committed content to equal the expected hash.
    pub fn with_verify_digests(mut self, verify: bool) -> Self {
        self.verify_digests = verify;
        self
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn catalog(&self) -> &Arc<Mutex<HashCatalog>> {
        &self.catalog
    }

    fn destination(&self, relative: &str) -> PatchResult<PathBuf> {
        resolve_in(&self.install_dir, relative).ok_or_else(|| PatchError::UnsafePath {
            path: relative.to_string(),
        })
    }

    /// Open a temporary file next to the destination of `relative`.
    pub fn stage(&self, relative: &str) -> PatchResult<StagedFile> {
        let destination = self.destination(relative)?;
        let parent = destination
            .parent()
            .unwrap_or(&self.install_dir)
            .to_path_buf();

        fs::create_dir_all(&parent).map_err(|source| PatchError::WriteError {
            path: parent.clone(),
            source,
        })?;

        let temp = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(&parent)
            .map_err(|source| PatchError::WriteError {
                path: destination.clone(),
                source,
            })?;

        Ok(StagedFile::new(relative, destination, temp))
    }

    /// Promote a staged file to its destination and record it in the catalog.
    ///
    /// Returns the number of bytes installed.
    pub fn commit(
        &self,
        staged: StagedFile,
        expected_hash: &str,
        expected_size: Option<u64>,
    ) -> PatchResult<u64> {
        let bytes = staged.bytes_written();
        let digest = staged.digest();
        let relative = staged.relative_path().to_string();

        if let Some(expected) = expected_size {
            if expected != bytes {
                return Err(PatchError::SizeMismatch {
                    path: relative,
                    expected,
                    actual: bytes,
                });
            }
        }
        if self.verify_digests && !digest.eq_ignore_ascii_case(expected_hash) {
            return Err(PatchError::DigestMismatch {
                path: relative,
                expected: expected_hash.to_string(),
                actual: digest,
            });
        }

        let (relative, destination, temp) = staged.finish().map_err(|source| {
            PatchError::WriteError {
                path: PathBuf::from(&relative),
                source,
            }
        })?;
        let write_err = |source: io::Error| PatchError::WriteError {
            path: destination.clone(),
            source,
        };

        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(&destination).map_err(|e| write_err(e.error))?;

        self.catalog
            .lock()
            .put(&relative, expected_hash, bytes)
            .map_err(|source| PatchError::Catalog {
                path: relative.clone(),
                source,
            })?;

        debug!(path = %relative, bytes, "Patched file");
        Ok(bytes)
    }

    /// Install `bytes` as `relative` in one step.
    pub fn apply(&self, relative: &str, bytes: &[u8], hash: &str) -> PatchResult<u64> {
        let mut staged = self.stage(relative)?;
        staged
            .write_all(bytes)
            .map_err(|source| PatchError::WriteError {
                path: staged.destination().to_path_buf(),
                source,
            })?;
        self.commit(staged, hash, Some(bytes.len() as u64))
    }

    /// Remove the local copy of `relative` and forget its hash.
    ///
    /// A file that is already gone is not an error. Returns whether a file
    /// was removed from disk.
    pub fn delete(&self, relative: &str) -> PatchResult<bool> {
        let destination = self.destination(relative)?;
        let removed = match fs::remove_file(&destination) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(source) => {
                return Err(PatchError::RemoveFailed {
                    path: destination,
                    source,
                })
            }
        };

        self.catalog
            .lock()
            .remove(relative)
            .map_err(|source| PatchError::Catalog {
                path: relative.to_string(),
                source,
            })?;

        info!(path = %relative, removed, "Deleted stale file");
        Ok(removed)
    }

    /// Remove staged files left behind by an interrupted run in the
    /// directories that hold the given paths. Returns how many were removed.
    pub fn sweep_staging<'a>(&self, relatives: impl IntoIterator<Item = &'a str>) -> usize {
        let dirs: BTreeSet<PathBuf> = relatives
            .into_iter()
            .filter_map(|relative| resolve_in(&self.install_dir, relative))
            .filter_map(|path| path.parent().map(Path::to_path_buf))
            .collect();

        let mut removed = 0;
        for dir in dirs {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if !(name.starts_with(STAGING_PREFIX) && name.ends_with(STAGING_SUFFIX)) {
                    continue;
                }
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to remove leftover staged file"),
                }
            }
        }

        if removed > 0 {
            info!(removed, "Removed leftover staged files");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn applier(install: &Path) -> PatchApplier {
        PatchApplier::new(install, Arc::new(Mutex::new(HashCatalog::in_memory())))
    }

    fn leftover_count(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(STAGING_SUFFIX))
            .count()
    }

    #[test]
    fn test_apply_writes_file_and_records_hash() {
        let install = TempDir::new().unwrap();
        let applier = applier(install.path());

        let bytes = applier.apply("data/a.dat", b"hello", "hashX").unwrap();

        assert_eq!(bytes, 5);
        assert_eq!(fs::read(install.path().join("data/a.dat")).unwrap(), b"hello");
        let catalog = applier.catalog().lock();
        let entry = catalog.get("data/a.dat").unwrap();
        assert_eq!(entry.hash, "hashX");
        assert_eq!(entry.size, 5);
    }

    #[test]
    fn test_apply_replaces_existing_file() {
        let install = TempDir::new().unwrap();
        fs::write(install.path().join("a.dat"), b"old contents").unwrap();
        let applier = applier(install.path());

        applier.apply("a.dat", b"new", "h2").unwrap();

        assert_eq!(fs::read(install.path().join("a.dat")).unwrap(), b"new");
        assert_eq!(leftover_count(install.path()), 0);
    }

    #[test]
    fn test_interrupted_write_leaves_destination_untouched() {
        let install = TempDir::new().unwrap();
        fs::write(install.path().join("a.dat"), b"original").unwrap();
        let applier = applier(install.path());
        applier.catalog().lock().put("a.dat", "hashOld", 8).unwrap();

        let mut staged = applier.stage("a.dat").unwrap();
        staged.write_all(b"half of the new ver").unwrap();
        drop(staged);

        assert_eq!(fs::read(install.path().join("a.dat")).unwrap(), b"original");
        assert_eq!(applier.catalog().lock().get("a.dat").unwrap().hash, "hashOld");
        assert_eq!(leftover_count(install.path()), 0);
    }

    #[test]
    fn test_rename_failure_is_write_error() {
        let install = TempDir::new().unwrap();
        fs::create_dir_all(install.path().join("a.dat/occupied")).unwrap();
        let applier = applier(install.path());

        let err = applier.apply("a.dat", b"bytes", "h").unwrap_err();

        assert!(matches!(err, PatchError::WriteError { .. }));
        assert!(install.path().join("a.dat/occupied").is_dir());
        assert!(applier.catalog().lock().get("a.dat").is_none());
        assert_eq!(leftover_count(install.path()), 0);
    }

    #[test]
    fn test_size_mismatch_keeps_previous_file() {
        let install = TempDir::new().unwrap();
        fs::write(install.path().join("a.dat"), b"original").unwrap();
        let applier = applier(install.path());

        let mut staged = applier.stage("a.dat").unwrap();
        staged.write_all(b"abc").unwrap();
        let err = applier.commit(staged, "h", Some(10)).unwrap_err();

        assert!(matches!(
            err,
            PatchError::SizeMismatch { expected: 10, actual: 3, .. }
        ));
        assert_eq!(fs::read(install.path().join("a.dat")).unwrap(), b"original");
        assert!(applier.catalog().lock().is_empty());
    }

    #[test]
    fn test_digest_verification() {
        let install = TempDir::new().unwrap();
        let applier = applier(install.path()).with_verify_digests(true);
        let abc = "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";

        assert!(matches!(
            applier.apply("a.dat", b"abc", "deadbeef"),
            Err(PatchError::DigestMismatch { .. })
        ));
        assert!(!install.path().join("a.dat").exists());

        applier.apply("a.dat", b"abc", abc).unwrap();
        assert!(install.path().join("a.dat").exists());
    }

    #[test]
    fn test_unsafe_path_is_rejected() {
        let install = TempDir::new().unwrap();
        let applier = applier(install.path());
        assert!(matches!(
            applier.stage("../outside.dat"),
            Err(PatchError::UnsafePath { .. })
        ));
    }

    #[test]
    fn test_delete_removes_file_and_entry() {
        let install = TempDir::new().unwrap();
        let applier = applier(install.path());
        applier.apply("old.dat", b"x", "h").unwrap();

        assert!(applier.delete("old.dat").unwrap());
        assert!(!install.path().join("old.dat").exists());
        assert!(applier.catalog().lock().get("old.dat").is_none());

        // Already gone on disk: still forgets the entry without error.
        applier.catalog().lock().put("ghost.dat", "h", 1).unwrap();
        assert!(!applier.delete("ghost.dat").unwrap());
        assert!(applier.catalog().lock().is_empty());
    }

    #[test]
    fn test_sweep_staging_removes_only_leftovers() {
        let install = TempDir::new().unwrap();
        let data = install.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join(".imagine-x1y2.part"), b"junk").unwrap();
        fs::write(data.join("keep.dat"), b"keep").unwrap();
        let applier = applier(install.path());

        let removed = applier.sweep_staging(["data/a.dat", "data/b.dat", "missing/c.dat"]);

        assert_eq!(removed, 1);
        assert!(data.join("keep.dat").exists());
        assert_eq!(leftover_count(&data), 0);
    }
}
