//! Command-line interface for `rm2gl`.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use clap_complete::Shell;

use crate::config::CliOverrides;

pub mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "rm2gl",
    version,
    about = "Migrate Redmine issues with their history into GitLab",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Configuration file (default: ./rm2gl.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Errors only.
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Also write JSON logs to this file.
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Override the Redmine base URL.
    #[arg(long, global = true, value_name = "URL")]
    pub source_host: Option<String>,

    /// Override the GitLab base URL.
    #[arg(long, global = true, value_name = "URL")]
    pub target_host: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Test the Redmine connection and show how projects map onto GitLab.
    Check(CheckArgs),

    /// Run the migration.
    Migrate(MigrateArgs),

    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct CheckArgs {
    /// Only check these Redmine project identifiers.
    #[arg(long = "project", value_name = "IDENTIFIER")]
    pub projects: Vec<String>,

    /// Print the mappings as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct MigrateArgs {
    /// Only migrate these Redmine project identifiers (repeatable).
    #[arg(long = "project", value_name = "IDENTIFIER")]
    pub projects: Vec<String>,

    /// Print the full report as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,

    /// Hide the progress bar.
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    pub shell: Shell,
}

impl Cli {
    /// Config overrides carried by the global flags and the command's filters.
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        let projects = match &self.command {
            Commands::Check(args) => args.projects.clone(),
            Commands::Migrate(args) => args.projects.clone(),
            Commands::Completions(_) => Vec::new(),
        };
        CliOverrides {
            config: self.config.clone(),
            source_host: self.source_host.clone(),
            target_host: self.target_host.clone(),
            projects,
        }
    }
}

/// Dispatch the parsed command.
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let overrides = cli.overrides();
    match &cli.command {
        Commands::Check(args) => commands::check::execute(args, &overrides)?,
        Commands::Migrate(args) => commands::migrate::execute(args, &overrides, cli.quiet)?,
        Commands::Completions(args) => commands::completions::execute(args),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn project_filters_flow_into_overrides() {
        let cli = Cli::parse_from([
            "rm2gl",
            "--target-host",
            "https://gitlab.example/",
            "migrate",
            "--project",
            "alpha",
            "--project",
            "beta",
        ]);
        let overrides = cli.overrides();
        assert_eq!(overrides.projects, ["alpha", "beta"]);
        assert_eq!(
            overrides.target_host.as_deref(),
            Some("https://gitlab.example/")
        );
        assert!(overrides.source_host.is_none());
    }

    #[test]
    fn verbosity_counts() {
        let cli = Cli::parse_from(["rm2gl", "-vv", "check"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }
}
