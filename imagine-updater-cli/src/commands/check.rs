//! Check command - report whether an update is needed without applying it.

use clap::Args;
use imagine_updater::config::format_size;
use imagine_updater::diff::ActionKind;
use imagine_updater::session::UpdateSession;

use super::common::{require_manifest_url, require_tag, resolve_session_config, SessionArgs, TargetArgs};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the check command.
#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// List every file that would be fetched or deleted
    #[arg(short, long)]
    pub list: bool,
}

/// Run the check command.
pub fn run(runner: &CliRunner, args: CheckArgs) -> Result<(), CliError> {
    runner.log_startup("check");
    let config = runner.config();

    let manifest_url = require_manifest_url(&args.target, config)?;
    let tag = require_tag(&args.target, config)?;
    let session_config = resolve_session_config(&args.target, &SessionArgs::default(), config);

    let session = UpdateSession::with_reqwest(session_config)?;
    let plan = session.check(&manifest_url, &tag)?;

    if plan.is_up_to_date() {
        println!("{}: up-to-date ({} files)", tag, plan.count(ActionKind::Skip));
        return Ok(());
    }

    println!("{}: update required", tag);
    println!(
        "  {} file(s) to fetch ({})",
        plan.count(ActionKind::Fetch),
        format_size(plan.fetch_bytes())
    );
    println!("  {} file(s) to delete", plan.count(ActionKind::Delete));
    println!("  {} file(s) up to date", plan.count(ActionKind::Skip));

    if args.list {
        println!();
        for action in plan.actions().iter().filter(|a| a.kind != ActionKind::Skip) {
            println!("  {:<6} {}", action.kind, action.path);
        }
    }
    Ok(())
}
