//! Init command - write a configuration file.

use std::path::PathBuf;

use clap::Args;
use imagine_updater::config::ConfigFile;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the init command.
#[derive(Debug, Args)]
pub struct InitArgs {
    /// Patch server base URL
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Release tag to install
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Game install directory
    #[arg(short = 'd', long, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// Replace existing settings instead of keeping them
    #[arg(long)]
    pub force: bool,
}

/// Run the init command.
pub fn run(runner: &CliRunner, args: InitArgs) -> Result<(), CliError> {
    let path = runner.config_path();
    let mut config = if args.force {
        ConfigFile::default()
    } else {
        runner.config().clone()
    };

    apply_init_args(&mut config, args);
    config.save_to(path)?;

    println!("Configuration file: {}", path.display());
    println!();
    println!("Edit this file to customize Imagine Updater settings.");
    println!("CLI arguments override config file values when specified.");
    Ok(())
}

/// Fill in settings given on the command line.
fn apply_init_args(config: &mut ConfigFile, args: InitArgs) {
    if let Some(server) = args.server {
        config.updater.base_url = Some(server);
    }
    if let Some(tag) = args.tag {
        config.updater.tag = Some(tag);
    }
    if let Some(dir) = args.install_dir {
        config.updater.install_dir = Some(dir);
    }
}
