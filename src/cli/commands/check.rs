//! Check command implementation.
//!
//! Tests the Redmine connection and resolves every selected project on GitLab
//! without creating anything.

use crate::cli::CheckArgs;
use crate::config;
use crate::error::Result;
use crate::migrate::{Migrator, ProjectMapping};
use crate::source::RedmineClient;
use crate::target::GitlabClient;
use tracing::info;

/// Execute the check command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, credentials are missing,
/// or either host cannot be reached.
pub fn execute(args: &CheckArgs, cli: &config::CliOverrides) -> Result<()> {
    let config = config::load_config(cli)?;
    let source = RedmineClient::from_config(&config)?;
    let target = GitlabClient::from_config(&config)?;
    let mut migrator = Migrator::new(source, target, config);

    let mappings = migrator.check()?;
    info!(projects = mappings.len(), "Checked project mappings");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&mappings)?);
        return Ok(());
    }
    for mapping in &mappings {
        println!("{}", mapping_line(mapping));
    }
    let missing = mappings.iter().filter(|m| m.target_id.is_none()).count();
    println!(
        "\n{} project(s), {} ready, {} without a target",
        mappings.len(),
        mappings.len() - missing,
        missing
    );
    Ok(())
}

fn mapping_line(mapping: &ProjectMapping) -> String {
    match (&mapping.target_path, mapping.target_id) {
        (Some(path), Some(id)) => format!("{} -> {path} (#{id})", mapping.source_identifier),
        (Some(path), None) => format!("{} -> {path} (not found)", mapping.source_identifier),
        (None, _) => format!("{} -> (not mapped)", mapping.source_identifier),
    }
}
