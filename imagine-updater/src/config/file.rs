//! INI-backed configuration file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;
use tracing::debug;

use super::config_file_path;
use crate::download::{manifest_url, DownloadError, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT_SECS};
use crate::session::{FailurePolicy, SessionConfig, DEFAULT_WORKERS};

const SECTION_UPDATER: &str = "updater";
const SECTION_DOWNLOAD: &str = "download";
const SECTION_SESSION: &str = "session";

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read or parsed.
    #[error("Failed to read config file {path}: {detail}")]
    ReadFailed { path: PathBuf, detail: String },

    /// The file could not be written.
    #[error("Failed to write config file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A value has the wrong type or is out of range.
    #[error("Invalid value '{value}' for {section}.{key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },

    /// The configured base URL cannot be turned into a manifest URL.
    #[error("Invalid patch server URL: {0}")]
    InvalidUrl(#[source] DownloadError),
}

/// `[updater]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdaterSettings {
    /// Patch server base URL; the manifest is `<base_url>/VersionData.txt`.
    pub base_url: Option<String>,
    /// Full manifest URL, overriding `base_url`.
    pub manifest_url: Option<String>,
    /// Active release tag.
    pub tag: Option<String>,
    pub install_dir: Option<PathBuf>,
    pub catalog_dir: Option<PathBuf>,
    /// Also write logs to this file.
    pub log_file: Option<PathBuf>,
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub max_attempts: u32,
    pub timeout_secs: u64,
    pub retry_delay_ms: u64,
    pub verify_digests: bool,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_delay_ms: 1000,
            verify_digests: false,
        }
    }
}

/// `[session]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub workers: usize,
    pub policy: FailurePolicy,
    pub reset_corrupt_catalog: bool,
    pub full_check: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            policy: FailurePolicy::default(),
            reset_corrupt_catalog: false,
            full_check: false,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub updater: UpdaterSettings,
    pub download: DownloadSettings,
    pub session: SessionSettings,
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let ini = match Ini::load_from_file(path) {
            Ok(ini) => ini,
            Err(ini::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::ReadFailed {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                })
            }
        };
        Self::from_ini(&ini)
    }

    /// Parse from INI text.
    pub fn parse(text: &str) -> ConfigResult<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::ReadFailed {
            path: PathBuf::from("<string>"),
            detail: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some(SECTION_UPDATER)) {
            let updater = &mut config.updater;
            updater.base_url = string_value(section, "base_url");
            updater.manifest_url = string_value(section, "manifest_url");
            updater.tag = string_value(section, "tag");
            updater.install_dir = string_value(section, "install_dir").map(PathBuf::from);
            updater.catalog_dir = string_value(section, "catalog_dir").map(PathBuf::from);
            updater.log_file = string_value(section, "log_file").map(PathBuf::from);
        }

        if let Some(section) = ini.section(Some(SECTION_DOWNLOAD)) {
            let download = &mut config.download;
            if let Some(v) = parsed_value(section, SECTION_DOWNLOAD, "max_attempts")? {
                download.max_attempts = positive(v, SECTION_DOWNLOAD, "max_attempts")?;
            }
            if let Some(v) = parsed_value(section, SECTION_DOWNLOAD, "timeout_secs")? {
                download.timeout_secs = positive(v, SECTION_DOWNLOAD, "timeout_secs")?;
            }
            if let Some(v) = parsed_value(section, SECTION_DOWNLOAD, "retry_delay_ms")? {
                download.retry_delay_ms = v;
            }
            if let Some(v) = bool_value(section, SECTION_DOWNLOAD, "verify_digests")? {
                download.verify_digests = v;
            }
        }

        if let Some(section) = ini.section(Some(SECTION_SESSION)) {
            let session = &mut config.session;
            if let Some(v) = parsed_value(section, SECTION_SESSION, "workers")? {
                session.workers = positive(v, SECTION_SESSION, "workers")?;
            }
            if let Some(v) = parsed_value(section, SECTION_SESSION, "policy")? {
                session.policy = v;
            }
            if let Some(v) = bool_value(section, SECTION_SESSION, "reset_corrupt_catalog")? {
                session.reset_corrupt_catalog = v;
            }
            if let Some(v) = bool_value(section, SECTION_SESSION, "full_check")? {
                session.full_check = v;
            }
        }

        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let write_err = |source: io::Error| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();

        let u = &self.updater;
        ini.with_section(Some(SECTION_UPDATER))
            .set("base_url", u.base_url.clone().unwrap_or_default())
            .set("manifest_url", u.manifest_url.clone().unwrap_or_default())
            .set("tag", u.tag.clone().unwrap_or_default())
            .set("install_dir", path_string(u.install_dir.as_deref()))
            .set("catalog_dir", path_string(u.catalog_dir.as_deref()))
            .set("log_file", path_string(u.log_file.as_deref()));

        ini.with_section(Some(SECTION_DOWNLOAD))
            .set("max_attempts", self.download.max_attempts.to_string())
            .set("timeout_secs", self.download.timeout_secs.to_string())
            .set("retry_delay_ms", self.download.retry_delay_ms.to_string())
            .set("verify_digests", self.download.verify_digests.to_string());

        ini.with_section(Some(SECTION_SESSION))
            .set("workers", self.session.workers.to_string())
            .set("policy", self.session.policy.name())
            .set(
                "reset_corrupt_catalog",
                self.session.reset_corrupt_catalog.to_string(),
            )
            .set("full_check", self.session.full_check.to_string());

        ini
    }

    /// Manifest URL from `manifest_url`, or derived from `base_url`.
    pub fn manifest_url(&self) -> ConfigResult<Option<String>> {
        if let Some(url) = &self.updater.manifest_url {
            return Ok(Some(url.clone()));
        }
        self.updater
            .base_url
            .as_deref()
            .map(manifest_url)
            .transpose()
            .map_err(ConfigError::InvalidUrl)
    }

    /// Session options for `install_dir`, taken from this file.
    pub fn session_config(&self, install_dir: impl Into<PathBuf>) -> SessionConfig {
        let mut config = SessionConfig::new(install_dir)
            .with_max_attempts(self.download.max_attempts)
            .with_timeout(Duration::from_secs(self.download.timeout_secs))
            .with_retry_delay(Duration::from_millis(self.download.retry_delay_ms))
            .with_verify_digests(self.download.verify_digests)
            .with_workers(self.session.workers)
            .with_policy(self.session.policy)
            .with_reset_corrupt_catalog(self.session.reset_corrupt_catalog)
            .with_full_check(self.session.full_check);
        if let Some(dir) = &self.updater.catalog_dir {
            config = config.with_catalog_dir(dir);
        }
        config
    }
}

/// Non-empty trimmed value of `key`.
fn string_value(section: &Properties, key: &str) -> Option<String> {
    section
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn invalid(section: &str, key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parsed_value<T: FromStr>(
    properties: &Properties,
    section: &str,
    key: &str,
) -> ConfigResult<Option<T>> {
    match string_value(properties, key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| invalid(section, key, &raw)),
        None => Ok(None),
    }
}

fn bool_value(properties: &Properties, section: &str, key: &str) -> ConfigResult<Option<bool>> {
    match string_value(properties, key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(invalid(section, key, &raw)),
        },
        None => Ok(None),
    }
}

fn positive<T: PartialOrd + Default + ToString>(value: T, section: &str, key: &str) -> ConfigResult<T> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(invalid(section, key, &value.to_string()))
    }
}

fn path_string(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string()).unwrap_or_default()
}
