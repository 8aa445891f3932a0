//! Migrate command implementation.

use crate::cli::MigrateArgs;
use crate::config;
use crate::error::Result;
use crate::migrate::{MigrationReport, Migrator, Progress, ProjectOutcome, ProjectReport};
use crate::source::RedmineClient;
use crate::target::GitlabClient;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use tracing::{debug, info};

const BAR_TEMPLATE: &str = "{msg:>18} [{bar:40}] {pos}/{len} ({percent}%)";

/// Execute the migrate command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, credentials are missing,
/// or the run hits a fatal error. Per-record failures end up in the report.
pub fn execute(args: &MigrateArgs, cli: &config::CliOverrides, quiet: bool) -> Result<()> {
    let config = config::load_config(cli)?;
    let source = RedmineClient::from_config(&config)?;
    let target = GitlabClient::from_config(&config)?;
    let mut migrator = Migrator::new(source, target, config);

    let bar = progress_bar(args.no_progress || quiet || args.json);
    let report = migrator.run_with_progress(&mut |progress: &Progress| update(&bar, progress));
    bar.finish_and_clear();
    let report = report?;

    info!(
        projects = report.projects.len(),
        issues = report.issues_created(),
        errors = report.error_count(),
        "Migration finished"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        print!("{}", render_summary(&report));
    }
    Ok(())
}

fn progress_bar(hidden: bool) -> ProgressBar {
    if hidden || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    ProgressBar::no_length().with_style(style)
}

fn update(bar: &ProgressBar, progress: &Progress) {
    debug!(
        phase = %progress.phase,
        done = progress.done,
        total = ?progress.total,
        "Progress"
    );
    bar.set_message(progress.phase.to_string());
    if let Some(total) = progress.total {
        bar.set_length(total as u64);
    }
    bar.set_position(progress.done as u64);
}

/// Plain-text summary, one block per project.
#[must_use]
pub fn render_summary(report: &MigrationReport) -> String {
    let mut out = String::new();
    for project in &report.projects {
        out.push_str(&project_summary(project));
    }
    out.push_str(&format!(
        "\n{} project(s), {} issue(s) created, {} error(s)\n",
        report.projects.len(),
        report.issues_created(),
        report.error_count()
    ));
    out
}

fn project_summary(project: &ProjectReport) -> String {
    let target = project.target_path.as_deref().unwrap_or("-");
    let mut out = match project.outcome {
        ProjectOutcome::NotFound => {
            return format!("{} -> {target}: not found\n", project.source_identifier);
        }
        ProjectOutcome::Pending => {
            format!("{} -> {target}: incomplete\n", project.source_identifier)
        }
        ProjectOutcome::Complete => format!("{} -> {target}\n", project.source_identifier),
    };
    out.push_str(&format!(
        "  issues {}, notes {}, events {}, labels {} new / {} attached, attachments {}, relations {}\n",
        project.issues_created,
        project.notes_created,
        project.events_created,
        project.labels_created,
        project.labels_attached,
        project.attachments_stored,
        project.relations_linked,
    ));
    if project.unmapped_users > 0 {
        out.push_str(&format!(
            "  {} unmapped user(s) routed to the default account\n",
            project.unmapped_users
        ));
    }
    if project.has_errors() {
        out.push_str(&format!(
            "  {} error(s), success rate {:.1}%\n",
            project.errors.len(),
            project.success_rate() * 100.0
        ));
        for error in &project.errors {
            out.push_str(&format!("    {}\n", error.summary()));
        }
    }
    out
}
