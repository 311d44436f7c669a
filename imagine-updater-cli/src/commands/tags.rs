//! Tags command - list the release tags a patch server offers.

use clap::Args;
use imagine_updater::config::format_size;
use imagine_updater::session::UpdateSession;

use super::common::{require_manifest_url, resolve_session_config, SessionArgs, TargetArgs};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the tags command.
#[derive(Debug, Args)]
pub struct TagsArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

/// Run the tags command.
pub fn run(runner: &CliRunner, args: TagsArgs) -> Result<(), CliError> {
    runner.log_startup("tags");
    let config = runner.config();

    let manifest_url = require_manifest_url(&args.target, config)?;
    let session_config = resolve_session_config(&args.target, &SessionArgs::default(), config);
    let session = UpdateSession::with_reqwest(session_config)?;
    let manifest = session.fetch_manifest(&manifest_url)?;

    if manifest.is_empty() {
        println!("No tags declared in {}", manifest_url);
        return Ok(());
    }

    let active = args.target.tag.as_deref().or(config.updater.tag.as_deref());
    println!("{:<2}{:<16} {:<28} {:>7} {:>10}  SERVER", "", "TAG", "TITLE", "FILES", "SIZE");
    for tag in manifest.tags() {
        let marker = if Some(tag.name.as_str()) == active { "*" } else { "" };
        println!(
            "{:<2}{:<16} {:<28} {:>7} {:>10}  {}",
            marker,
            tag.name,
            tag.title,
            tag.files.len(),
            format_size(tag.declared_bytes()),
            tag.server
        );
    }
    Ok(())
}
