//! Imagine Updater - game client patcher
//!
//! This library keeps a game install in line with a release published on a
//! patch server. A session downloads the version manifest, compares the
//! active release tag with the local hash list, and then fetches, replaces
//! or deletes only the files that changed.
//!
//! # Components
//!
//! - [`manifest`]: `VersionData.txt` model and strict parser
//! - [`catalog`]: durable hash list of installed files
//! - [`diff`]: pure reconciliation of a tag against the hash list
//! - [`download`]: HTTP(S) fetches with bounded retry on timeout
//! - [`patch`]: staged writes and atomic replacement of installed files
//! - [`session`]: the end-to-end update run and its progress events
//! - [`config`]: INI configuration file
//! - [`logging`]: tracing subscriber setup

pub mod catalog;
pub mod config;
pub mod diff;
pub mod download;
pub mod logging;
pub mod manifest;
pub mod patch;
pub mod session;

pub use catalog::HashCatalog;
pub use diff::{plan, ActionKind, Plan, PlannedAction};
pub use download::{Downloader, HttpTransport, ReqwestTransport};
pub use manifest::{parse, Manifest};
pub use patch::PatchApplier;
pub use session::{FailurePolicy, SessionConfig, SessionError, SessionReport, UpdateSession};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
