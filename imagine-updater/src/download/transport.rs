//! HTTP transport abstraction for testability.

use std::io::{self, Read};
use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;

/// Default per-attempt timeout for connects and reads.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Failure to obtain a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connecting or waiting for the response headers timed out.
    #[error("Connection timed out")]
    Timeout,

    /// Any other transport failure.
    #[error("{0}")]
    Failed(String),
}

/// A response whose headers have arrived and whose body is still streaming.
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    /// Build a response with an in-memory body.
    pub fn from_bytes(status: u16, reason: impl Into<String>, body: Vec<u8>) -> Self {
        let len = body.len() as u64;
        Self {
            status,
            reason: reason.into(),
            headers: vec![("content-length".to_string(), len.to_string())],
            content_length: Some(len),
            body: Box::new(io::Cursor::new(body)),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the status allows a body at all.
    pub fn expects_body(&self) -> bool {
        !matches!(self.status, 204 | 205)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Trait for issuing HTTP GET requests.
///
/// Implementations return once the response headers are available; the
/// body is read incrementally by the caller.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Real transport backed by a blocking reqwest client.
///
/// The timeout applies to connecting and to each individual read.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a transport with a custom per-attempt timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("imagine-updater/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Failed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Failed(e.to_string())
            }
        })?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}

/// Whether a body read error means the per-read timeout expired.
pub(crate) fn is_timeout_error(error: &io::Error) -> bool {
    if matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    ) {
        return true;
    }
    error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
        .is_some_and(reqwest::Error::is_timeout)
}
