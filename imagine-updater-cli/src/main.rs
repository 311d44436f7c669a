//! Imagine Updater CLI - headless game client updater
//!
//! Downloads the version manifest from a patch server, compares the chosen
//! release tag with the local hash list and applies only what changed.

mod commands;
mod error;
mod progress;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::check::CheckArgs;
use commands::init::InitArgs;
use commands::tags::TagsArgs;
use commands::update::UpdateArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "imagine-updater")]
#[command(version, about = "Keep a game install in sync with its patch server", long_about = None)]
struct Cli {
    /// Configuration file [default: <config dir>/imagine-updater/updater.ini]
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging (includes HTTP response headers)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download and apply the files that changed
    Update(UpdateArgs),

    /// Report whether an update is required without applying it
    Check(CheckArgs),

    /// List the release tags declared by the patch server
    Tags(TagsArgs),

    /// Create or update the configuration file
    Init(InitArgs),
}

fn run(cli: Cli) -> Result<(), CliError> {
    let runner = CliRunner::new(cli.config.as_deref(), cli.verbose)?;
    match cli.command {
        Commands::Update(args) => commands::update::run(&runner, args),
        Commands::Check(args) => commands::check::run(&runner, args),
        Commands::Tags(args) => commands::tags::run(&runner, args),
        Commands::Init(args) => commands::init::run(&runner, args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
