//! Argument resolution shared across commands.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use imagine_updater::config::ConfigFile;
use imagine_updater::download::manifest_url;
use imagine_updater::session::{FailurePolicy, SessionConfig};

use crate::error::CliError;

/// Where to update from and what to update.
#[derive(Debug, Clone, Default, Args)]
pub struct TargetArgs {
    /// Patch server base URL (manifest is <URL>/VersionData.txt)
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Full manifest URL, overriding --server
    #[arg(long, value_name = "URL")]
    pub manifest_url: Option<String>,

    /// Release tag to install (e.g. Live)
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Game install directory
    #[arg(short = 'd', long, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// Directory holding the hash list [default: install directory]
    #[arg(long, value_name = "DIR")]
    pub catalog_dir: Option<PathBuf>,
}

/// Overrides for `[download]` and `[session]` settings.
#[derive(Debug, Clone, Default, Args)]
pub struct SessionArgs {
    /// Attempts per file before giving up on timeouts
    #[arg(long, value_name = "N")]
    pub attempts: Option<u32>,

    /// Per-attempt timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Files to download concurrently
    #[arg(short = 'j', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Continue past failed files and report them all at the end
    #[arg(long)]
    pub best_effort: bool,

    /// Recheck installed files and refetch missing or resized ones
    #[arg(long)]
    pub full_check: bool,

    /// Start from an empty hash list if the stored one is corrupt
    #[arg(long)]
    pub reset_catalog: bool,

    /// Verify the SHA-256 of every downloaded file against the manifest
    #[arg(long)]
    pub verify: bool,
}

/// Manifest URL: CLI > config > error.
pub fn require_manifest_url(args: &TargetArgs, config: &ConfigFile) -> Result<String, CliError> {
    if let Some(url) = &args.manifest_url {
        return Ok(url.clone());
    }
    if let Some(base) = &args.server {
        return manifest_url(base).map_err(|e| CliError::Config(e.to_string()));
    }
    config.manifest_url()?.ok_or_else(|| {
        CliError::Config(
            "No patch server specified. Use --server or set base_url in updater.ini [updater] section."
                .to_string(),
        )
    })
}

/// Release tag: CLI > config > error.
pub fn require_tag(args: &TargetArgs, config: &ConfigFile) -> Result<String, CliError> {
    args.tag
        .clone()
        .or_else(|| config.updater.tag.clone())
        .ok_or_else(|| {
            CliError::Config(
                "No release tag specified. Use --tag or set tag in updater.ini [updater] section."
                    .to_string(),
            )
        })
}

/// Install directory: CLI > config > current directory.
pub fn resolve_install_dir(args: &TargetArgs, config: &ConfigFile) -> PathBuf {
    args.install_dir
        .clone()
        .or_else(|| config.updater.install_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Build session options from the config file with CLI overrides applied.
pub fn resolve_session_config(
    target: &TargetArgs,
    overrides: &SessionArgs,
    config: &ConfigFile,
) -> SessionConfig {
    let mut session = config.session_config(resolve_install_dir(target, config));

    if let Some(dir) = &target.catalog_dir {
        session = session.with_catalog_dir(dir);
    }
    if let Some(attempts) = overrides.attempts {
        session = session.with_max_attempts(attempts);
    }
    if let Some(secs) = overrides.timeout {
        session = session.with_timeout(Duration::from_secs(secs.max(1)));
    }
    if let Some(workers) = overrides.workers {
        session = session.with_workers(workers);
    }
    if overrides.best_effort {
        session = session.with_policy(FailurePolicy::BestEffort);
    }
    if overrides.full_check {
        session = session.with_full_check(true);
    }
    if overrides.reset_catalog {
        session = session.with_reset_corrupt_catalog(true);
    }
    if overrides.verify {
        session = session.with_verify_digests(true);
    }
    session
}
