//! Local hash catalog (`hashlist.dat` + `hashlist.ver`).
//!
//! The catalog remembers the hash and size of every file the updater has
//! installed, so the next session only fetches what changed. It is updated
//! one file at a time while a session runs; an interrupted session resumes
//! from the last file that was fully applied.

mod error;
mod journal;
mod store;

pub use error::{CatalogError, CatalogResult};
pub use journal::CATALOG_FORMAT_VERSION;
pub use store::{CatalogEntry, HashCatalog, HASHLIST_FILE, HASHLIST_VERSION_FILE};
