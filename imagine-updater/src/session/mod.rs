//! Update session orchestration.
//!
//! An [`UpdateSession`] ties the other components together:
//!
//! ```text
//! FetchingManifest → Parsing → Planning → Applying → Finished
//!       │              │          │           │
//!   Downloader   ManifestParser  HashCatalog  Downloader + PatchApplier
//!                               + DiffEngine  (per file, optional workers)
//! ```
//!
//! Progress is reported through [`SessionEvent`]s. Per-file failures are
//! collected into a [`SessionReport`] in plan order so a later run can retry
//! just the failed subset.

mod config;
mod error;
mod events;
mod report;
mod runner;

pub use config::{FailurePolicy, SessionConfig, DEFAULT_WORKERS, MAX_WORKERS};
pub use error::{SessionError, SessionResult};
pub use events::{EventCallback, SessionEvent, SessionStage};
pub use report::{FileError, FileFailure, SessionReport};
pub use runner::UpdateSession;
