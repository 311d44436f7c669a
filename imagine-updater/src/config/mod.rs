//! Configuration file support.
//!
//! Settings live in an INI file, by default
//! `<config dir>/imagine-updater/updater.ini`:
//!
//! ```ini
//! [updater]
//! base_url = http://patch.example.com/imagine
//! tag = Live
//! install_dir = /games/imagine
//!
//! [download]
//! max_attempts = 3
//! timeout_secs = 30
//!
//! [session]
//! workers = 4
//! policy = best-effort
//! ```
//!
//! Command-line flags override file values, which override built-in defaults.

mod file;
mod size;

use std::path::PathBuf;

pub use file::{ConfigError, ConfigFile, ConfigResult, DownloadSettings, SessionSettings, UpdaterSettings};
pub use size::format_size;

/// Name of the application directory under the platform config dir.
pub const APP_DIR_NAME: &str = "imagine-updater";

/// File name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "updater.ini";

/// Directory holding the configuration file.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Default location of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}
