//! Durable path → hash/size catalog.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::error::{CatalogError, CatalogResult};
use super::journal::{self, Record, CATALOG_FORMAT_VERSION};
use crate::manifest::{normalize_relative_path, resolve_in};

/// File holding the catalog journal.
pub const HASHLIST_FILE: &str = "hashlist.dat";

/// File holding the catalog format stamp.
pub const HASHLIST_VERSION_FILE: &str = "hashlist.ver";

/// Last known state of one installed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub hash: String,
    pub size: u64,
}

/// Local record of installed file hashes.
///
/// Every [`put`](Self::put) and [`remove`](Self::remove) is appended to
/// `hashlist.dat` and synced before returning, so the on-disk state always
/// matches the last completed call. [`compact`](Self::compact) folds the
/// journal down to one record per entry.
#[derive(Debug)]
pub struct HashCatalog {
    entries: BTreeMap<String, CatalogEntry>,
    store: Option<JournalStore>,
}

#[derive(Debug)]
struct JournalStore {
    dir: PathBuf,
    /// Append handle, opened on first write.
    handle: Option<File>,
    /// Records currently in the journal file.
    records: usize,
}

impl HashCatalog {
    /// A catalog that lives only in memory. Writes are never persisted.
    pub fn in_memory() -> Self {
        Self {
            entries: BTreeMap::new(),
            store: None,
        }
    }

    /// Load the catalog kept in `dir`.
    ///
    /// A missing `hashlist.dat` yields an empty catalog. A torn final record
    /// left by an interrupted write is dropped and truncated away.
    pub fn load(dir: &Path) -> CatalogResult<Self> {
        let scan = scan(dir)?;
        if let Some(complete_len) = scan.torn_at {
            truncate(&dir.join(HASHLIST_FILE), complete_len)?;
        }
        Ok(Self::with_store(dir, scan.entries, scan.records))
    }

    /// Read the catalog kept in `dir` without modifying anything on disk.
    ///
    /// A torn final record is ignored but left in place. The result is not
    /// bound to `dir`: writes to it are never persisted.
    pub fn snapshot(dir: &Path) -> CatalogResult<Self> {
        let scan = scan(dir)?;
        Ok(Self {
            entries: scan.entries,
            store: None,
        })
    }

    /// Discard whatever catalog state exists in `dir` and start empty.
    pub fn reset(dir: &Path) -> CatalogResult<Self> {
        let data_path = dir.join(HASHLIST_FILE);
        match fs::remove_file(&data_path) {
            Ok(()) => info!(path = %data_path.display(), "Removed hash list"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CatalogError::WriteFailed {
                    path: data_path,
                    source: e,
                })
            }
        }
        write_stamp(dir)?;
        Ok(Self::with_store(dir, BTreeMap::new(), 0))
    }

    fn with_store(dir: &Path, entries: BTreeMap<String, CatalogEntry>, records: usize) -> Self {
        Self {
            entries,
            store: Some(JournalStore {
                dir: dir.to_path_buf(),
                handle: None,
                records,
            }),
        }
    }

    /// Directory the catalog persists to, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.store.as_ref().map(|s| s.dir.as_path())
    }

    pub fn get(&self, path: &str) -> Option<&CatalogEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CatalogEntry)> {
        self.entries.iter().map(|(path, entry)| (path.as_str(), entry))
    }

    /// Record `path` as installed with `hash` and `size`.
    pub fn put(&mut self, path: &str, hash: &str, size: u64) -> CatalogResult<()> {
        if normalize_relative_path(path).as_deref() != Some(path) {
            return Err(CatalogError::UnsafePath(path.to_string()));
        }
        if !journal::is_valid_hash(hash) {
            return Err(CatalogError::InvalidHash {
                path: path.to_string(),
                hash: hash.to_string(),
            });
        }

        let record = Record::Put {
            path: path.to_string(),
            hash: hash.to_string(),
            size,
        };
        self.append(&record)?;
        apply_record(&mut self.entries, record);
        Ok(())
    }

    /// Forget `path`. Returns the entry that was removed, if any.
    pub fn remove(&mut self, path: &str) -> CatalogResult<Option<CatalogEntry>> {
        if !self.entries.contains_key(path) {
            return Ok(None);
        }
        self.append(&Record::Delete {
            path: path.to_string(),
        })?;
        Ok(self.entries.remove(path))
    }

    /// Drop entries whose file is missing under `install_dir` or whose size
    /// on disk differs from the recorded size. Returns the dropped paths.
    pub fn retain_present(&mut self, install_dir: &Path) -> CatalogResult<Vec<String>> {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(path, entry)| {
                let on_disk = resolve_in(install_dir, path)
                    .and_then(|full| fs::metadata(full).ok())
                    .filter(|meta| meta.is_file())
                    .map(|meta| meta.len());
                on_disk != Some(entry.size)
            })
            .map(|(path, _)| path.clone())
            .collect();

        for path in &stale {
            debug!(path = %path, "Local file missing or resized, forgetting hash");
            self.remove(path)?;
        }
        Ok(stale)
    }

    /// Whether the journal holds noticeably more records than live entries.
    pub fn needs_compaction(&self) -> bool {
        self.store
            .as_ref()
            .is_some_and(|s| s.records > self.entries.len() * 2 + 32)
    }

    /// Rewrite the journal atomically with one `put` record per entry.
    pub fn compact(&mut self) -> CatalogResult<()> {
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };

        let mut contents = String::new();
        for (path, entry) in &self.entries {
            let record = Record::Put {
                path: path.clone(),
                hash: entry.hash.clone(),
                size: entry.size,
            };
            contents.push_str(&record.encode());
        }

        // Close the append handle before the file is replaced underneath it.
        store.handle = None;
        write_stamp(&store.dir)?;
        write_atomic(&store.dir, HASHLIST_FILE, contents.as_bytes())?;
        info!(
            entries = self.entries.len(),
            dropped = store.records.saturating_sub(self.entries.len()),
            "Compacted hash list"
        );
        store.records = self.entries.len();
        Ok(())
    }

    fn append(&mut self, record: &Record) -> CatalogResult<()> {
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        let data_path = store.dir.join(HASHLIST_FILE);
        let write_err = |source: io::Error| CatalogError::WriteFailed {
            path: data_path.clone(),
            source,
        };

        if store.handle.is_none() {
            fs::create_dir_all(&store.dir).map_err(write_err)?;
            if !store.dir.join(HASHLIST_VERSION_FILE).exists() {
                write_stamp(&store.dir)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&data_path)
                .map_err(write_err)?;
            store.handle = Some(file);
        }

        if let Some(file) = store.handle.as_mut() {
            file.write_all(record.encode().as_bytes())
                .and_then(|()| file.sync_data())
                .map_err(write_err)?;
        }
        store.records += 1;
        Ok(())
    }
}

fn apply_record(entries: &mut BTreeMap<String, CatalogEntry>, record: Record) {
    match record {
        Record::Put { path, hash, size } => {
            entries.insert(path, CatalogEntry { hash, size });
        }
        Record::Delete { path } => {
            entries.remove(&path);
        }
    }
}

/// Decoded contents of a journal directory.
struct Scan {
    entries: BTreeMap<String, CatalogEntry>,
    records: usize,
    /// Length of the intact prefix when the journal ends in a torn record.
    torn_at: Option<u64>,
}

fn scan(dir: &Path) -> CatalogResult<Scan> {
    let data_path = dir.join(HASHLIST_FILE);
    let stamp_path = dir.join(HASHLIST_VERSION_FILE);

    let bytes = match fs::read(&data_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            check_stamp(&stamp_path, true)?;
            debug!(dir = %dir.display(), "No hash list found, starting empty");
            return Ok(Scan {
                entries: BTreeMap::new(),
                records: 0,
                torn_at: None,
            });
        }
        Err(e) => {
            return Err(CatalogError::ReadFailed {
                path: data_path,
                source: e,
            })
        }
    };

    check_stamp(&stamp_path, false)?;

    let complete_len = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    let text = std::str::from_utf8(&bytes[..complete_len]).map_err(|e| {
        let line_number = bytes[..e.valid_up_to()].iter().filter(|&&b| b == b'\n').count() + 1;
        CatalogError::CorruptCatalog {
            path: data_path.clone(),
            line_number,
            reason: "not valid UTF-8".to_string(),
        }
    })?;

    let mut entries = BTreeMap::new();
    let mut records = 0;
    for (index, line) in text.lines().enumerate() {
        let record = Record::decode(line).map_err(|reason| CatalogError::CorruptCatalog {
            path: data_path.clone(),
            line_number: index + 1,
            reason,
        })?;
        apply_record(&mut entries, record);
        records += 1;
    }

    let torn_at = if complete_len < bytes.len() {
        warn!(
            path = %data_path.display(),
            dropped = bytes.len() - complete_len,
            "Discarding torn record at end of hash list"
        );
        Some(complete_len as u64)
    } else {
        None
    };

    debug!(
        entries = entries.len(),
        records,
        "Loaded hash list from {}",
        data_path.display()
    );
    Ok(Scan {
        entries,
        records,
        torn_at,
    })
}

/// Validate `hashlist.ver`. A missing stamp is only acceptable when there is
/// no hash list either.
fn check_stamp(stamp_path: &Path, allow_missing: bool) -> CatalogResult<()> {
    let incompatible = |found: Option<String>| CatalogError::IncompatibleCatalogVersion {
        path: stamp_path.to_path_buf(),
        found,
        expected: CATALOG_FORMAT_VERSION,
    };

    let text = match fs::read_to_string(stamp_path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return if allow_missing {
                Ok(())
            } else {
                Err(incompatible(None))
            };
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidData => return Err(incompatible(None)),
        Err(e) => {
            return Err(CatalogError::ReadFailed {
                path: stamp_path.to_path_buf(),
                source: e,
            })
        }
    };

    match journal::decode_stamp(&text) {
        Some(CATALOG_FORMAT_VERSION) => Ok(()),
        _ => Err(incompatible(Some(text.trim().to_string()))),
    }
}

fn write_stamp(dir: &Path) -> CatalogResult<()> {
    write_atomic(dir, HASHLIST_VERSION_FILE, journal::encode_stamp().as_bytes())
}

/// Write `name` in `dir` via a synced temp file and rename.
fn write_atomic(dir: &Path, name: &str, contents: &[u8]) -> CatalogResult<()> {
    let target = dir.join(name);
    let write_err = |source: io::Error| CatalogError::WriteFailed {
        path: target.clone(),
        source,
    };

    fs::create_dir_all(dir).map_err(write_err)?;
    let mut temp = tempfile::Builder::new()
        .prefix(".imagine-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_err)?;
    temp.write_all(contents)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(write_err)?;
    temp.persist(&target).map_err(|e| write_err(e.error))?;
    Ok(())
}

fn truncate(path: &Path, len: u64) -> CatalogResult<()> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.set_len(len).and_then(|()| file.sync_all()))
        .map_err(|source| CatalogError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let catalog = HashCatalog::load(temp.path()).unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.dir(), Some(temp.path()));
    }

    #[test]
    fn test_put_is_visible_to_fresh_load() {
        let temp = TempDir::new().unwrap();
        let mut catalog = HashCatalog::load(temp.path()).unwrap();
        catalog.put("a.dat", "hashX", 10).unwrap();
        catalog.put("data/b.dat", "hashY", 20).unwrap();

        // No compaction, no drop: the journal alone must carry the state.
        let reloaded = HashCatalog::load(temp.path()).unwrap();
        assert_eq!(
            reloaded.get("a.dat"),
            Some(&CatalogEntry {
                hash: "hashX".to_string(),
                size: 10
            })
        );
        assert_eq!(reloaded.get("data/b.dat").unwrap().size, 20);
        assert!(temp.path().join(HASHLIST_VERSION_FILE).exists());
    }

    #[test]
    fn test_put_overwrites_and_remove_forgets() {
        let temp = TempDir::new().unwrap();
        let mut catalog = HashCatalog::load(temp.path()).unwrap();
        catalog.put("a.dat", "old", 1).unwrap();
        catalog.put("a.dat", "new", 2).unwrap();
        catalog.put("b.dat", "b", 3).unwrap();
        let removed = catalog.remove("b.dat").unwrap();

        assert_eq!(removed.map(|e| e.hash), Some("b".to_string()));
        assert_eq!(catalog.remove("missing.dat").unwrap(), None);

        let reloaded = HashCatalog::load(temp.path()).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("a.dat").unwrap().hash, "new");
        assert!(reloaded.get("b.dat").is_none());
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let temp = TempDir::new().unwrap();
        {
            let mut catalog = HashCatalog::load(temp.path()).unwrap();
            catalog.put("a.dat", "hashX", 10).unwrap();
        }
        let data = temp.path().join(HASHLIST_FILE);
        let mut file = OpenOptions::new().append(true).open(&data).unwrap();
        file.write_all(b"put\t5\thalf").unwrap();
        drop(file);

        let mut catalog = HashCatalog::load(temp.path()).unwrap();
        assert_eq!(catalog.len(), 1);

        // Appending after recovery must not glue onto the torn fragment.
        catalog.put("b.dat", "hashY", 3).unwrap();
        let reloaded = HashCatalog::load(temp.path()).unwrap();
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn test_snapshot_leaves_torn_tail_in_place() {
        let temp = TempDir::new().unwrap();
        {
            let mut catalog = HashCatalog::load(temp.path()).unwrap();
            catalog.put("a.dat", "hashX", 10).unwrap();
        }
        let data = temp.path().join(HASHLIST_FILE);
        let mut file = OpenOptions::new().append(true).open(&data).unwrap();
        file.write_all(b"put\t5\thalf").unwrap();
        drop(file);
        let before = fs::read(&data).unwrap();

        let mut snapshot = HashCatalog::snapshot(temp.path()).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.dir().is_none());
        snapshot.put("b.dat", "hashY", 3).unwrap();
        assert_eq!(fs::read(&data).unwrap(), before);
    }

    #[test]
    fn test_corrupt_record_reports_line() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(HASHLIST_VERSION_FILE), journal::encode_stamp()).unwrap();
        fs::write(
            temp.path().join(HASHLIST_FILE),
            "put\t1\th\ta.dat\nthis is not a record\n",
        )
        .unwrap();

        let err = HashCatalog::load(temp.path()).unwrap_err();
        assert!(err.is_corrupt());
        assert!(matches!(err, CatalogError::CorruptCatalog { line_number: 2, .. }));
    }

    #[test]
    fn test_version_mismatch_is_incompatible() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(HASHLIST_VERSION_FILE), "imagine-hashlist 99\n").unwrap();
        fs::write(temp.path().join(HASHLIST_FILE), "").unwrap();

        let err = HashCatalog::load(temp.path()).unwrap_err();
        assert!(err.is_corrupt());
        assert!(matches!(
            err,
            CatalogError::IncompatibleCatalogVersion { found: Some(ref v), .. } if v == "imagine-hashlist 99"
        ));
    }

    #[test]
    fn test_hashlist_without_stamp_is_incompatible() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(HASHLIST_FILE), "put\t1\th\ta.dat\n").unwrap();

        let err = HashCatalog::load(temp.path()).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::IncompatibleCatalogVersion { found: None, .. }
        ));
    }

    #[test]
    fn test_reset_discards_corrupt_state() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(HASHLIST_FILE), "garbage").unwrap();

        let mut catalog = HashCatalog::reset(temp.path()).unwrap();
        assert!(catalog.is_empty());
        catalog.put("a.dat", "h", 1).unwrap();
        assert_eq!(HashCatalog::load(temp.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_compact_keeps_entries() {
        let temp = TempDir::new().unwrap();
        let mut catalog = HashCatalog::load(temp.path()).unwrap();
        for i in 0..50 {
            catalog.put("a.dat", &format!("h{i}"), i).unwrap();
        }
        catalog.put("b.dat", "b", 7).unwrap();
        assert!(catalog.needs_compaction());

        catalog.compact().unwrap();
        assert!(!catalog.needs_compaction());
        let text = fs::read_to_string(temp.path().join(HASHLIST_FILE)).unwrap();
        assert_eq!(text.lines().count(), 2);

        // The append handle is reopened after compaction.
        catalog.put("c.dat", "c", 1).unwrap();
        let reloaded = HashCatalog::load(temp.path()).unwrap();
        assert_eq!(reloaded.get("a.dat").unwrap().hash, "h49");
        assert_eq!(reloaded.len(), 3);
    }

    #[test]
    fn test_put_rejects_unsafe_path() {
        let mut catalog = HashCatalog::in_memory();
        assert!(matches!(
            catalog.put("../x", "h", 1),
            Err(CatalogError::UnsafePath(_))
        ));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_retain_present_drops_missing_and_resized() {
        let install = TempDir::new().unwrap();
        fs::write(install.path().join("ok.dat"), b"12345").unwrap();
        fs::write(install.path().join("resized.dat"), b"123").unwrap();

        let mut catalog = HashCatalog::in_memory();
        catalog.put("ok.dat", "a", 5).unwrap();
        catalog.put("resized.dat", "b", 5).unwrap();
        catalog.put("gone.dat", "c", 5).unwrap();

        let dropped = catalog.retain_present(install.path()).unwrap();
        assert_eq!(dropped, vec!["gone.dat".to_string(), "resized.dat".to_string()]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("ok.dat").is_some());
    }
}
