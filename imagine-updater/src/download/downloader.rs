//! Fetching one resource with bounded retry on timeout.

use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::error::{DownloadError, DownloadResult};
use super::sink::DownloadSink;
use super::transport::{is_timeout_error, HttpResponse, HttpTransport, TransportError};

/// Buffer size for streaming response bodies (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Default number of attempts per resource.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between a timed-out attempt and the next one.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Granularity at which a retry pause checks for cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Per-fetch options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Pause before retrying after a timeout.
    pub retry_delay: Duration,
    /// Accept a success response with an empty body.
    pub allow_empty_body: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            allow_empty_body: false,
        }
    }
}

impl DownloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_allow_empty_body(mut self, allow: bool) -> Self {
        self.allow_empty_body = allow;
        self
    }
}

/// Lifecycle of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Connecting,
    HeaderReceived,
    BodyStreaming,
    Completed,
    Failed,
}

/// Bookkeeping for the attempt currently in progress.
#[derive(Debug, Clone)]
pub struct DownloadAttempt {
    pub url: String,
    pub attempt_number: u32,
    pub bytes_received: u64,
    pub status: Option<u16>,
    pub state: AttemptState,
}

impl DownloadAttempt {
    fn new(url: &str, attempt_number: u32) -> Self {
        Self {
            url: url.to_string(),
            attempt_number,
            bytes_received: 0,
            status: None,
            state: AttemptState::Connecting,
        }
    }

    fn transition(&mut self, state: AttemptState) {
        trace!(
            url = %self.url,
            attempt = self.attempt_number,
            from = ?self.state,
            to = ?state,
            "Attempt state change"
        );
        self.state = state;
    }
}

/// Observational events emitted during a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    AttemptStarted {
        url: String,
        attempt: u32,
        max_attempts: u32,
    },
    HeadersReceived {
        url: String,
        status: u16,
        reason: String,
        headers: Vec<(String, String)>,
    },
    Progress {
        url: String,
        bytes_received: u64,
        total: Option<u64>,
    },
    RetryScheduled {
        url: String,
        failed_attempt: u32,
        retries_left: u32,
    },
    Completed {
        url: String,
        bytes: u64,
        attempts: u32,
    },
}

/// Summary of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub url: String,
    /// Attempt number that completed.
    pub attempts: u32,
    pub bytes: u64,
    pub status: u16,
}

/// Why an attempt ended without completing.
enum AttemptFailure {
    Timeout,
    Fatal(DownloadError),
}

/// Streams resources from an [`HttpTransport`] into a [`DownloadSink`].
#[derive(Clone)]
pub struct Downloader {
    transport: Arc<dyn HttpTransport>,
    cancel: CancellationToken,
}

impl Downloader {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `token` to abort fetches cooperatively.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fetch `url` into `sink`.
    ///
    /// Timeouts are retried up to `options.max_attempts` total attempts, each
    /// on a fresh request; the sink is reset before every retry. Any other
    /// failure is returned immediately.
    pub fn fetch(
        &self,
        url: &str,
        sink: &mut dyn DownloadSink,
        options: &DownloadOptions,
        observer: &dyn Fn(&DownloadEvent),
    ) -> DownloadResult<DownloadReport> {
        let max_attempts = options.max_attempts.max(1);
        debug!(url, max_attempts, "Starting download");

        for attempt_number in 1..=max_attempts {
            self.check_cancelled(url)?;
            observer(&DownloadEvent::AttemptStarted {
                url: url.to_string(),
                attempt: attempt_number,
                max_attempts,
            });

            let mut attempt = DownloadAttempt::new(url, attempt_number);
            match self.run_attempt(&mut attempt, sink, options, observer) {
                Ok(status) => {
                    debug!(url, bytes = attempt.bytes_received, attempt = attempt_number, "Download finished");
                    observer(&DownloadEvent::Completed {
                        url: url.to_string(),
                        bytes: attempt.bytes_received,
                        attempts: attempt_number,
                    });
                    return Ok(DownloadReport {
                        url: url.to_string(),
                        attempts: attempt_number,
                        bytes: attempt.bytes_received,
                        status,
                    });
                }
                Err(AttemptFailure::Fatal(error)) => {
                    debug!(url, attempt = attempt_number, %error, "Download failed");
                    return Err(error);
                }
                Err(AttemptFailure::Timeout) => {
                    let retries_left = max_attempts - attempt_number;
                    if retries_left == 0 {
                        warn!(url, attempts = attempt_number, "Download timeout: giving up");
                        return Err(DownloadError::TimeoutExhausted {
                            url: url.to_string(),
                            attempts: attempt_number,
                        });
                    }

                    warn!(
                        url,
                        attempt = attempt_number,
                        retries_left,
                        "Download timeout: will retry download"
                    );
                    observer(&DownloadEvent::RetryScheduled {
                        url: url.to_string(),
                        failed_attempt: attempt_number,
                        retries_left,
                    });
                    sink.reset().map_err(|source| DownloadError::Sink {
                        url: url.to_string(),
                        source,
                    })?;
                    self.pause(url, options.retry_delay)?;
                }
            }
        }

        Err(DownloadError::TimeoutExhausted {
            url: url.to_string(),
            attempts: max_attempts,
        })
    }

    fn run_attempt(
        &self,
        attempt: &mut DownloadAttempt,
        sink: &mut dyn DownloadSink,
        options: &DownloadOptions,
        observer: &dyn Fn(&DownloadEvent),
    ) -> Result<u16, AttemptFailure> {
        let url = attempt.url.clone();

        let response = match self.transport.get(&url) {
            Ok(response) => response,
            Err(TransportError::Timeout) => {
                attempt.transition(AttemptState::Failed);
                return Err(AttemptFailure::Timeout);
            }
            Err(TransportError::Failed(detail)) => {
                attempt.transition(AttemptState::Failed);
                return Err(AttemptFailure::Fatal(DownloadError::Transport { url, detail }));
            }
        };

        attempt.status = Some(response.status);
        attempt.transition(AttemptState::HeaderReceived);
        log_headers(&url, &response);
        observer(&DownloadEvent::HeadersReceived {
            url: url.clone(),
            status: response.status,
            reason: response.reason.clone(),
            headers: response.headers.clone(),
        });

        if !response.is_success() {
            attempt.transition(AttemptState::Failed);
            return Err(AttemptFailure::Fatal(DownloadError::HttpStatus {
                url,
                code: response.status,
                reason: response.reason,
            }));
        }

        let status = response.status;
        let expects_body = response.expects_body();
        let content_length = response.content_length;

        attempt.transition(AttemptState::BodyStreaming);
        let result = self.stream_body(attempt, response, sink, observer);
        if result.is_err() {
            attempt.transition(AttemptState::Failed);
        }
        result?;

        if attempt.bytes_received == 0 && expects_body && !options.allow_empty_body {
            attempt.transition(AttemptState::Failed);
            return Err(AttemptFailure::Fatal(DownloadError::EmptyBody { url }));
        }
        if let Some(expected) = content_length {
            if attempt.bytes_received < expected {
                attempt.transition(AttemptState::Failed);
                return Err(AttemptFailure::Fatal(DownloadError::Transport {
                    url,
                    detail: format!(
                        "connection closed after {} of {} bytes",
                        attempt.bytes_received, expected
                    ),
                }));
            }
        }

        sink.flush().map_err(|source| {
            AttemptFailure::Fatal(DownloadError::Sink {
                url: url.clone(),
                source,
            })
        })?;
        attempt.transition(AttemptState::Completed);
        Ok(status)
    }

    fn stream_body(
        &self,
        attempt: &mut DownloadAttempt,
        mut response: HttpResponse,
        sink: &mut dyn DownloadSink,
        observer: &dyn Fn(&DownloadEvent),
    ) -> Result<(), AttemptFailure> {
        let url = attempt.url.clone();
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            if self.cancel.is_cancelled() {
                return Err(AttemptFailure::Fatal(DownloadError::Cancelled { url }));
            }

            let bytes_read = match response.body.read(&mut buffer) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout_error(&e) => return Err(AttemptFailure::Timeout),
                Err(e) => {
                    return Err(AttemptFailure::Fatal(DownloadError::Transport {
                        url,
                        detail: format!("Read error: {}", e),
                    }))
                }
            };

            if bytes_read == 0 {
                return Ok(());
            }

            sink.write_all(&buffer[..bytes_read]).map_err(|source| {
                AttemptFailure::Fatal(DownloadError::Sink {
                    url: url.clone(),
                    source,
                })
            })?;

            attempt.bytes_received += bytes_read as u64;
            trace!(url = %url, bytes = bytes_read, total = attempt.bytes_received, "Read bytes of data");
            observer(&DownloadEvent::Progress {
                url: url.clone(),
                bytes_received: attempt.bytes_received,
                total: response.content_length,
            });
        }
    }

    fn check_cancelled(&self, url: &str) -> DownloadResult<()> {
        if self.cancel.is_cancelled() {
            Err(DownloadError::Cancelled {
                url: url.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Sleep for `delay`, waking early if cancelled.
    fn pause(&self, url: &str, delay: Duration) -> DownloadResult<()> {
        let deadline = Instant::now() + delay;
        loop {
            self.check_cancelled(url)?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(CANCEL_POLL_INTERVAL));
        }
    }
}

fn log_headers(url: &str, response: &HttpResponse) {
    debug!(url, status = response.status, reason = %response.reason, "-- BEGIN HEADER --");
    for (name, value) in &response.headers {
        debug!("Header: {}: {}", name, value);
    }
    debug!(url, "-- END HEADER --");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Scripted outcome for one call to `get`.
    enum Step {
        Timeout,
        Fail(&'static str),
        Respond(u16, &'static [u8]),
        /// Deliver some bytes, then time out mid-body.
        StallAfter(&'static [u8]),
    }

    struct ScriptedTransport {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    struct StallingBody {
        data: io::Cursor<Vec<u8>>,
    }

    impl Read for StallingBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
                n => Ok(n),
            }
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn get(&self, _url: &str) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more often than scripted");
            match step {
                Step::Timeout => Err(TransportError::Timeout),
                Step::Fail(detail) => Err(TransportError::Failed(detail.to_string())),
                Step::Respond(status, body) => {
                    Ok(HttpResponse::from_bytes(status, reason_for(status), body.to_vec()))
                }
                Step::StallAfter(body) => Ok(HttpResponse {
                    status: 200,
                    reason: "OK".to_string(),
                    headers: Vec::new(),
                    content_length: None,
                    body: Box::new(StallingBody {
                        data: io::Cursor::new(body.to_vec()),
                    }),
                }),
            }
        }
    }

    fn reason_for(status: u16) -> &'static str {
        match status {
            200 => "OK",
            204 => "No Content",
            404 => "Not Found",
            _ => "",
        }
    }

    fn fast_options(max_attempts: u32) -> DownloadOptions {
        DownloadOptions::new()
            .with_max_attempts(max_attempts)
            .with_retry_delay(Duration::ZERO)
    }

    fn fetch(
        transport: Arc<ScriptedTransport>,
        options: &DownloadOptions,
    ) -> (DownloadResult<DownloadReport>, Vec<u8>, Vec<DownloadEvent>) {
        let downloader = Downloader::new(transport);
        let events = Mutex::new(Vec::new());
        let mut sink = Vec::new();
        let result = downloader.fetch("http://example.com/a.dat", &mut sink, options, &|e| {
            events.lock().unwrap().push(e.clone())
        });
        (result, sink, events.into_inner().unwrap())
    }

    #[test]
    fn test_fetch_first_attempt() {
        let transport = ScriptedTransport::new(vec![Step::Respond(200, b"payload")]);
        let (result, sink, events) = fetch(transport.clone(), &fast_options(3));

        let report = result.unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.bytes, 7);
        assert_eq!(report.status, 200);
        assert_eq!(sink, b"payload");
        assert_eq!(transport.calls(), 1);

        assert!(matches!(events.first(), Some(DownloadEvent::AttemptStarted { attempt: 1, max_attempts: 3, .. })));
        assert!(events.iter().any(|e| matches!(e, DownloadEvent::HeadersReceived { status: 200, .. })));
        assert!(events.iter().any(|e| matches!(e, DownloadEvent::Progress { bytes_received: 7, total: Some(7), .. })));
        assert!(matches!(events.last(), Some(DownloadEvent::Completed { bytes: 7, attempts: 1, .. })));
    }

    #[test]
    fn test_timeouts_then_success_records_attempt_number() {
        let transport = ScriptedTransport::new(vec![
            Step::Timeout,
            Step::StallAfter(b"stale partial"),
            Step::Respond(200, b"fresh"),
        ]);
        let (result, sink, events) = fetch(transport.clone(), &fast_options(3));

        assert_eq!(result.unwrap().attempts, 3);
        assert_eq!(sink, b"fresh");
        assert_eq!(transport.calls(), 3);

        let retries: Vec<(u32, u32)> = events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::RetryScheduled {
                    failed_attempt,
                    retries_left,
                    ..
                } => Some((*failed_attempt, *retries_left)),
                _ => None,
            })
            .collect();
        assert_eq!(retries, vec![(1, 2), (2, 1)]);
    }

    #[test]
    fn test_timeout_on_every_attempt_gives_up() {
        let transport = ScriptedTransport::new(vec![Step::Timeout, Step::Timeout, Step::Timeout]);
        let (result, _, _) = fetch(transport.clone(), &fast_options(3));

        let err = result.unwrap_err();
        assert!(matches!(err, DownloadError::TimeoutExhausted { attempts: 3, .. }));
        assert_eq!(err.retries_consumed(), 2);
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let transport = ScriptedTransport::new(vec![Step::Timeout]);
        let (result, _, _) = fetch(transport.clone(), &fast_options(0));
        assert!(matches!(result, Err(DownloadError::TimeoutExhausted { attempts: 1, .. })));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_transport_failure_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Step::Fail("connection reset"), Step::Respond(200, b"x")]);
        let (result, _, _) = fetch(transport.clone(), &fast_options(3));

        assert!(matches!(
            result,
            Err(DownloadError::Transport { ref detail, .. }) if detail == "connection reset"
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_http_status_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Step::Respond(404, b"missing"), Step::Respond(200, b"x")]);
        let (result, sink, _) = fetch(transport.clone(), &fast_options(3));

        match result {
            Err(DownloadError::HttpStatus { code, reason, .. }) => {
                assert_eq!(code, 404);
                assert_eq!(reason, "Not Found");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(sink.is_empty());
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_empty_body_is_an_error() {
        let transport = ScriptedTransport::new(vec![Step::Respond(200, b"")]);
        let (result, _, _) = fetch(transport.clone(), &fast_options(3));
        assert!(matches!(result, Err(DownloadError::EmptyBody { .. })));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_empty_body_allowed_when_requested() {
        let transport = ScriptedTransport::new(vec![Step::Respond(200, b"")]);
        let options = fast_options(1).with_allow_empty_body(true);
        let (result, _, _) = fetch(transport, &options);
        assert_eq!(result.unwrap().bytes, 0);
    }

    #[test]
    fn test_no_content_status_completes_without_body() {
        let transport = ScriptedTransport::new(vec![Step::Respond(204, b"")]);
        let (result, _, _) = fetch(transport, &fast_options(1));
        assert_eq!(result.unwrap().status, 204);
    }

    #[test]
    fn test_truncated_body_is_transport_error() {
        struct Truncated;
        impl HttpTransport for Truncated {
            fn get(&self, _url: &str) -> Result<HttpResponse, TransportError> {
                let mut response = HttpResponse::from_bytes(200, "OK", b"abc".to_vec());
                response.content_length = Some(10);
                Ok(response)
            }
        }

        let downloader = Downloader::new(Arc::new(Truncated));
        let mut sink = Vec::new();
        let result = downloader.fetch("http://example.com/a", &mut sink, &fast_options(3), &|_| {});
        assert!(matches!(result, Err(DownloadError::Transport { .. })));
    }

    #[test]
    fn test_cancelled_before_first_attempt() {
        let transport = ScriptedTransport::new(vec![Step::Respond(200, b"x")]);
        let token = CancellationToken::new();
        token.cancel();
        let downloader = Downloader::new(transport.clone()).with_cancellation(token);

        let mut sink = Vec::new();
        let result = downloader.fetch("http://example.com/a", &mut sink, &fast_options(3), &|_| {});
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_cancel_between_attempts_stops_retrying() {
        let transport = ScriptedTransport::new(vec![Step::Timeout, Step::Respond(200, b"x")]);
        let token = CancellationToken::new();
        let downloader = Downloader::new(transport.clone()).with_cancellation(token.clone());

        let mut sink = Vec::new();
        let result = downloader.fetch("http://example.com/a", &mut sink, &fast_options(3), &|e| {
            if let DownloadEvent::RetryScheduled { .. } = e {
                token.cancel();
            }
        });
        assert!(matches!(result, Err(DownloadError::Cancelled { .. })));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_cancel_while_streaming() {
        let transport = ScriptedTransport::new(vec![Step::Respond(200, b"data")]);
        let token = CancellationToken::new();
        let downloader = Downloader::new(transport).with_cancellation(token.clone());

        let mut sink = Vec::new();
        let result = downloader.fetch("http://example.com/a", &mut sink, &fast_options(1), &|e| {
            if let DownloadEvent::HeadersReceived { .. } = e {
                token.cancel();
            }
        });
        assert!(result.unwrap_err().is_cancelled());
        assert!(sink.is_empty());
    }
}
