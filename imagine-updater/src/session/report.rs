//! Outcome of an update session.

use thiserror::Error;

use crate::diff::ActionKind;
use crate::download::DownloadError;
use crate::patch::PatchError;

/// Why a single planned action failed.
#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// A failed action, tied back to its position in the plan.
#[derive(Debug)]
pub struct FileFailure {
    /// Index of the action in the plan.
    pub index: usize,
    pub path: String,
    pub action: ActionKind,
    pub error: FileError,
}

/// What a session did.
///
/// Path lists are in plan order. Paths that appear in none of `fetched`,
/// `deleted` or `failures` and were not skipped were never attempted
/// (fail-fast stop or cancellation).
#[derive(Debug, Default)]
pub struct SessionReport {
    pub tag: String,
    /// Number of actions in the plan.
    pub total_actions: usize,
    pub fetched: Vec<String>,
    pub deleted: Vec<String>,
    pub skipped: Vec<String>,
    pub bytes_downloaded: u64,
    pub failures: Vec<FileFailure>,
    /// Hash list entries dropped by a full check.
    pub rechecked: Vec<String>,
    /// Leftover staged files removed before applying.
    pub staging_removed: usize,
}

impl SessionReport {
    pub(crate) fn new(tag: &str, total_actions: usize) -> Self {
        Self {
            tag: tag.to_string(),
            total_actions,
            ..Self::default()
        }
    }

    /// Actions applied or skipped successfully.
    pub fn completed(&self) -> usize {
        self.fetched.len() + self.deleted.len() + self.skipped.len()
    }

    /// Every planned action succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.completed() == self.total_actions
    }

    /// Paths of failed actions, in plan order.
    pub fn failed_paths(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.path.as_str()).collect()
    }
}
