//! Shared setup for commands: configuration file and logging.

use std::path::{Path, PathBuf};

use imagine_updater::config::{config_file_path, ConfigFile};
use imagine_updater::logging::{init_logging, LogConfig, LoggingGuard};
use tracing::{debug, info};

use crate::error::CliError;

/// Loaded configuration plus the logging guard for one CLI invocation.
pub struct CliRunner {
    config: ConfigFile,
    config_path: PathBuf,
    _log_guard: LoggingGuard,
}

impl CliRunner {
    /// Load the configuration file and install the tracing subscriber.
    ///
    /// `config_path` overrides the default location. Logging is set up
    /// before the file is parsed so a broken file still gets reported.
    pub fn new(config_path: Option<&Path>, verbose: bool) -> Result<Self, CliError> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(config_file_path);
        let loaded = ConfigFile::load_from(&config_path);

        let log_file = loaded
            .as_ref()
            .ok()
            .and_then(|c| c.updater.log_file.clone());
        let log_guard = init_logging(
            LogConfig::new()
                .with_verbose(verbose)
                .with_file(log_file),
        )?;

        let config = loaded?;
        debug!(path = %config_path.display(), "Loaded configuration");
        Ok(Self {
            config,
            config_path,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = imagine_updater::VERSION,
            command,
            config = %self.config_path.display(),
            "Imagine Updater starting"
        );
    }
}
