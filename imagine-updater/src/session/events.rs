//! Progress and diagnostic events emitted by a running session.

use std::fmt;
use std::sync::Arc;

use crate::diff::ActionKind;
use crate::download::DownloadEvent;

/// Stage of an update session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    /// Downloading the manifest.
    FetchingManifest,
    /// Parsing the manifest.
    Parsing,
    /// Loading the hash list and computing the plan.
    Planning,
    /// Working through the plan.
    Applying { done: usize, total: usize },
    /// All planned actions applied.
    Finished,
}

impl SessionStage {
    /// Get a human-readable name for this stage.
    pub fn name(&self) -> &'static str {
        match self {
            SessionStage::FetchingManifest => "Fetching manifest",
            SessionStage::Parsing => "Parsing manifest",
            SessionStage::Planning => "Planning",
            SessionStage::Applying { .. } => "Applying",
            SessionStage::Finished => "Finished",
        }
    }
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStage::Applying { done, total } => write!(f, "Applying ({}/{})", done, total),
            other => f.write_str(other.name()),
        }
    }
}

/// Something observable happened during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StageChanged(SessionStage),

    ManifestDownloadStarted { url: String },

    ManifestDownloadFinished { url: String, bytes: u64 },

    /// The plan is computed and about to be applied.
    PlanReady {
        tag: String,
        fetch: usize,
        delete: usize,
        skip: usize,
        fetch_bytes: u64,
    },

    /// A fetch or delete is starting.
    FileStarted {
        index: usize,
        total: usize,
        path: String,
        action: ActionKind,
    },

    /// Downloader event; `path` is `None` for the manifest itself.
    Download {
        path: Option<String>,
        event: DownloadEvent,
    },

    FileFinished {
        index: usize,
        total: usize,
        path: String,
        action: ActionKind,
        bytes: u64,
    },

    /// A fetch or delete failed; `error` is the rendered failure.
    FileFailed {
        index: usize,
        path: String,
        action: ActionKind,
        error: String,
    },

    SessionFinished {
        fetched: usize,
        deleted: usize,
        skipped: usize,
        bytes: u64,
    },

    SessionFailed { stage: SessionStage, error: String },
}

/// Callback receiving session events. May be called from worker threads.
pub type EventCallback = Arc<dyn Fn(&SessionEvent) + Send + Sync>;
