//! CLI error type and exit codes.

use std::fmt;

use imagine_updater::config::ConfigError;
use imagine_updater::download::TransportError;
use imagine_updater::logging::LoggingError;
use imagine_updater::session::SessionError;

/// Exit code when the update itself failed.
pub const EXIT_FAILURE: u8 = 1;
/// Exit code for configuration and usage problems.
pub const EXIT_CONFIG: u8 = 2;
/// Exit code after Ctrl-C.
pub const EXIT_CANCELLED: u8 = 130;

/// Errors surfaced by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Missing or invalid settings.
    Config(String),
    ConfigFile(ConfigError),
    Logging(LoggingError),
    Transport(TransportError),
    Session(SessionError),
    /// Installing the Ctrl-C handler failed.
    Signal(String),
}

impl CliError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) | CliError::ConfigFile(_) => EXIT_CONFIG,
            CliError::Session(e) if e.is_cancelled() => EXIT_CANCELLED,
            _ => EXIT_FAILURE,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Logging(e) => write!(f, "{}", e),
            CliError::Transport(e) => write!(f, "Failed to create HTTP client: {}", e),
            CliError::Session(e) => write!(f, "{}", e),
            CliError::Signal(msg) => write!(f, "Failed to set signal handler: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Transport(e) => Some(e),
            CliError::Session(e) => Some(e),
            CliError::Config(_) | CliError::Signal(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<TransportError> for CliError {
    fn from(e: TransportError) -> Self {
        CliError::Transport(e)
    }
}

impl From<SessionError> for CliError {
    fn from(e: SessionError) -> Self {
        CliError::Session(e)
    }
}
