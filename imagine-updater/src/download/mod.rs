//! Resilient HTTP(S) downloads.
//!
//! This module provides:
//! - An HTTP transport seam with a blocking reqwest implementation (`transport`)
//! - Sinks that receive streamed bodies and can start over (`sink`)
//! - The retrying single-resource downloader (`downloader`)
//! - Helpers for building manifest and file URLs (`url`)
//!
//! # Architecture
//!
//! ```text
//! Downloader::fetch(url, sink, options)
//!         │
//!         ├── attempt 1: Connecting → HeaderReceived → BodyStreaming → Completed
//!         │                   │                                  │
//!         │                   └──────── Timeout ─────────────────┘
//!         │                               │
//!         ├── attempt 2 (fresh request, sink reset) ...
//!         │
//!         └── TimeoutExhausted after max_attempts
//! ```
//!
//! Only timeouts are retried. Transport failures, non-success status codes
//! and empty bodies end the fetch immediately.

mod downloader;
mod error;
mod sink;
mod transport;
mod url;

pub use downloader::{
    AttemptState, DownloadAttempt, DownloadEvent, DownloadOptions, DownloadReport, Downloader,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY,
};
pub use error::{DownloadError, DownloadResult};
pub use sink::DownloadSink;
pub use transport::{
    HttpResponse, HttpTransport, ReqwestTransport, TransportError, DEFAULT_TIMEOUT_SECS,
};
pub use url::{manifest_url, resource_url};
