//! Error types for HTTP downloads.

use std::io;

use thiserror::Error;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Terminal outcome of a failed fetch.
///
/// Only timeouts are retried; every other variant is reported as soon as it
/// happens.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Every attempt timed out.
    #[error("Download timeout: giving up on {url} after {attempts} attempt(s)")]
    TimeoutExhausted { url: String, attempts: u32 },

    /// Connection reset, DNS failure, TLS failure, truncated body.
    #[error("Download failed: {url}: {detail}")]
    Transport { url: String, detail: String },

    /// The server answered with a non-success status.
    #[error("Download failed: Server returned status code {code} {reason} for {url}")]
    HttpStatus {
        url: String,
        code: u16,
        reason: String,
    },

    /// The connection closed without delivering any body bytes.
    #[error("Connection closed but no bytes received from {url}")]
    EmptyBody { url: String },

    /// The cancellation token fired.
    #[error("Download of {url} was cancelled")]
    Cancelled { url: String },

    /// The destination sink rejected the data.
    #[error("Failed to store data from {url}: {source}")]
    Sink {
        url: String,
        #[source]
        source: io::Error,
    },

    /// A resource URL could not be built.
    #[error("Invalid URL {url}: {detail}")]
    InvalidUrl { url: String, detail: String },
}

impl DownloadError {
    /// Number of automatic retries that were used before giving up.
    pub fn retries_consumed(&self) -> u32 {
        match self {
            DownloadError::TimeoutExhausted { attempts, .. } => attempts.saturating_sub(1),
            _ => 0,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled { .. })
    }

    /// URL the failed request was for.
    pub fn url(&self) -> &str {
        match self {
            DownloadError::TimeoutExhausted { url, .. }
            | DownloadError::Transport { url, .. }
            | DownloadError::HttpStatus { url, .. }
            | DownloadError::EmptyBody { url }
            | DownloadError::Cancelled { url }
            | DownloadError::Sink { url, .. }
            | DownloadError::InvalidUrl { url, .. } => url,
        }
    }
}
