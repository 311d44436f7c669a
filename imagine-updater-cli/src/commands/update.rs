//! Update command - bring the install in line with a release tag.

use clap::Args;
use imagine_updater::config::format_size;
use imagine_updater::session::{SessionReport, UpdateSession};

use super::common::{require_manifest_url, require_tag, resolve_session_config, SessionArgs, TargetArgs};
use crate::error::CliError;
use crate::progress::ProgressReporter;
use crate::runner::CliRunner;

/// Arguments for the update command.
#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub session: SessionArgs,

    /// Do not draw a progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Run the update command.
pub fn run(runner: &CliRunner, args: UpdateArgs) -> Result<(), CliError> {
    runner.log_startup("update");
    let config = runner.config();

    let manifest_url = require_manifest_url(&args.target, config)?;
    let tag = require_tag(&args.target, config)?;
    let session_config = resolve_session_config(&args.target, &args.session, config);

    println!("Imagine Updater v{}", imagine_updater::VERSION);
    println!("=========================");
    println!();
    println!("Manifest:    {}", manifest_url);
    println!("Tag:         {}", tag);
    println!("Install dir: {}", session_config.install_dir.display());
    println!("Policy:      {}", session_config.policy);
    println!();

    let progress = ProgressReporter::new(!args.no_progress);
    let session = UpdateSession::with_reqwest(session_config)?.with_event_callback(progress.callback());

    // Ctrl-C cancels cooperatively; files already applied stay recorded.
    let token = session.cancellation_token();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, cancelling update...");
        token.cancel();
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    match session.run(&manifest_url, &tag) {
        Ok(report) => {
            print_summary(&report);
            println!();
            println!("Update complete.");
            Ok(())
        }
        Err(e) => {
            if let Some(report) = e.report() {
                print_summary(report);
                print_failures(report);
            }
            Err(e.into())
        }
    }
}

fn print_summary(report: &SessionReport) {
    println!();
    println!("Update Summary");
    println!("──────────────");
    println!(
        "  Fetched:    {} file(s), {}",
        report.fetched.len(),
        format_size(report.bytes_downloaded)
    );
    println!("  Deleted:    {} file(s)", report.deleted.len());
    println!("  Up to date: {} file(s)", report.skipped.len());
    if !report.rechecked.is_empty() {
        println!("  Rechecked:  {} file(s) missing or changed on disk", report.rechecked.len());
    }
    if !report.failures.is_empty() {
        println!("  Failed:     {} file(s)", report.failures.len());
    }
    let untouched = report.total_actions - report.completed() - report.failures.len();
    if untouched > 0 {
        println!("  Not attempted: {} file(s)", untouched);
    }
}

fn print_failures(report: &SessionReport) {
    if report.failures.is_empty() {
        return;
    }
    println!();
    println!("Failed files:");
    for failure in &report.failures {
        println!("  {} {}: {}", failure.action, failure.path, failure.error);
    }
}
