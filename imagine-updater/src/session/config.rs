//! Session configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::download::{DownloadOptions, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT_SECS};

/// Default number of files fetched concurrently.
pub const DEFAULT_WORKERS: usize = 1;

/// Upper bound on concurrent file workers.
pub const MAX_WORKERS: usize = 16;

// =============================================================================
// Failure Policy
// =============================================================================

/// What the session does when a fetch or delete fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failed file.
    #[default]
    FailFast,

    /// Keep going and report every failed file at the end.
    BestEffort,
}

impl FailurePolicy {
    pub fn name(&self) -> &'static str {
        match self {
            FailurePolicy::FailFast => "fail-fast",
            FailurePolicy::BestEffort => "best-effort",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" | "failfast" => Ok(FailurePolicy::FailFast),
            "best-effort" | "besteffort" | "continue" => Ok(FailurePolicy::BestEffort),
            other => Err(format!(
                "unknown failure policy '{}' (expected fail-fast or best-effort)",
                other
            )),
        }
    }
}

// =============================================================================
// Session Config
// =============================================================================

/// Options for an [`UpdateSession`](super::UpdateSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Root the manifest paths are resolved against.
    pub install_dir: PathBuf,
    /// Directory holding the hash list; the install directory when unset.
    pub catalog_dir: Option<PathBuf>,
    /// Attempts per file, including the first.
    pub max_attempts: u32,
    /// Connect and read timeout of one attempt.
    pub timeout: Duration,
    /// Pause between a timed-out attempt and the next.
    pub retry_delay: Duration,
    /// Files fetched concurrently.
    pub workers: usize,
    pub policy: FailurePolicy,
    /// Start from an empty hash list when the stored one is unreadable.
    pub reset_corrupt_catalog: bool,
    /// Drop hash list entries whose files are missing or resized before planning.
    pub full_check: bool,
    /// Compare the SHA-256 of every fetched file with its manifest hash.
    pub verify_digests: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

impl SessionConfig {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            catalog_dir: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_delay: DEFAULT_RETRY_DELAY,
            workers: DEFAULT_WORKERS,
            policy: FailurePolicy::default(),
            reset_corrupt_catalog: false,
            full_check: false,
            verify_digests: false,
        }
    }

    pub fn with_catalog_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.catalog_dir = Some(dir.into());
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the worker count, clamped to `1..=MAX_WORKERS`.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, MAX_WORKERS);
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_reset_corrupt_catalog(mut self, reset: bool) -> Self {
        self.reset_corrupt_catalog = reset;
        self
    }

    pub fn with_full_check(mut self, full_check: bool) -> Self {
        self.full_check = full_check;
        self
    }

    pub fn with_verify_digests(mut self, verify: bool) -> Self {
        self.verify_digests = verify;
        self
    }

    /// Directory the hash list lives in.
    pub fn catalog_dir(&self) -> &Path {
        self.catalog_dir.as_deref().unwrap_or(&self.install_dir)
    }

    /// Download options shared by the manifest and every file fetch.
    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions::new()
            .with_max_attempts(self.max_attempts)
            .with_retry_delay(self.retry_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::new("/games/live");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.workers, 1);
        assert_eq!(config.policy, FailurePolicy::FailFast);
        assert!(!config.reset_corrupt_catalog);
        assert_eq!(config.catalog_dir(), Path::new("/games/live"));
    }

    #[test]
    fn test_builders_clamp() {
        let config = SessionConfig::new("/x")
            .with_workers(0)
            .with_max_attempts(0)
            .with_catalog_dir("/state");
        assert_eq!(config.workers, 1);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.catalog_dir(), Path::new("/state"));
        assert_eq!(SessionConfig::new("/x").with_workers(500).workers, MAX_WORKERS);
    }

    #[test]
    fn test_download_options_follow_config() {
        let options = SessionConfig::new("/x")
            .with_max_attempts(5)
            .with_retry_delay(Duration::from_millis(10))
            .download_options();
        assert_eq!(options.max_attempts, 5);
        assert_eq!(options.retry_delay, Duration::from_millis(10));
        assert!(!options.allow_empty_body);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("best-effort".parse(), Ok(FailurePolicy::BestEffort));
        assert_eq!(" Fail-Fast ".parse(), Ok(FailurePolicy::FailFast));
        assert!("sometimes".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::BestEffort.to_string(), "best-effort");
    }
}
