//! Error types for update sessions.

use thiserror::Error;

use super::events::SessionStage;
use super::report::SessionReport;
use crate::catalog::CatalogError;
use crate::diff::PlanError;
use crate::download::DownloadError;
use crate::manifest::ManifestError;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Terminal failure of an update session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The manifest could not be downloaded.
    #[error("Failed to download manifest: {0}")]
    ManifestDownload(#[source] DownloadError),

    /// The manifest body is not UTF-8 text.
    #[error("Manifest is not valid UTF-8 (byte {valid_up_to})")]
    ManifestEncoding { valid_up_to: usize },

    /// The manifest failed to parse.
    #[error("Invalid manifest: {0}")]
    Manifest(#[from] ManifestError),

    /// The local hash list could not be loaded.
    #[error("Failed to load hash list: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Failed to plan update: {0}")]
    Plan(#[from] PlanError),

    /// The cancel signal fired. The report lists what was applied first.
    #[error("Update cancelled after {} of {} actions", .report.completed(), .report.total_actions)]
    Cancelled { report: Box<SessionReport> },

    /// One or more files failed; see `report.failures`.
    #[error("{} file(s) failed to update", .report.failures.len())]
    FilesFailed { report: Box<SessionReport> },
}

impl SessionError {
    /// Stage the session was in when it failed.
    pub fn stage(&self) -> SessionStage {
        match self {
            SessionError::ManifestDownload(_) => SessionStage::FetchingManifest,
            SessionError::ManifestEncoding { .. } | SessionError::Manifest(_) => {
                SessionStage::Parsing
            }
            SessionError::Catalog(_) | SessionError::Plan(_) => SessionStage::Planning,
            SessionError::Cancelled { report } | SessionError::FilesFailed { report } => {
                SessionStage::Applying {
                    done: report.completed(),
                    total: report.total_actions,
                }
            }
        }
    }

    /// Report of the apply stage, when it was reached.
    pub fn report(&self) -> Option<&SessionReport> {
        match self {
            SessionError::Cancelled { report } | SessionError::FilesFailed { report } => {
                Some(report.as_ref())
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            SessionError::Cancelled { .. } => true,
            SessionError::ManifestDownload(e) => e.is_cancelled(),
            _ => false,
        }
    }
}
