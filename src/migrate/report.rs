//! Per-project outcome tracking.
//!
//! A [`ProjectReport`] collects counters and recoverable failures while a
//! project moves through its [`ProjectPhase`]s. Failures that only affect one
//! record are absorbed here; fatal ones are handed back to the caller.

use crate::error::{ErrorCode, MigrateError, Result};
use serde::Serialize;
use tracing::{error, warn};

/// Record types named in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    Issue,
    Note,
    Event,
    Label,
    Description,
    Attachment,
    Relation,
    /// A read (user, status table, issue page) whose absence was covered by
    /// a fallback.
    Lookup,
}

impl RecordKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Note => "note",
            Self::Event => "event",
            Self::Label => "label",
            Self::Description => "description",
            Self::Attachment => "attachment",
            Self::Relation => "relation",
            Self::Lookup => "lookup",
        }
    }
}

/// A read or write that failed without stopping the project.
#[derive(Debug, Clone, Serialize)]
pub struct RecordError {
    pub kind: RecordKind,
    /// Redmine issue being processed, when there is one.
    pub source_issue: Option<u64>,
    pub code: ErrorCode,
    pub message: String,
}

impl RecordError {
    #[must_use]
    pub fn new(kind: RecordKind, source_issue: Option<u64>, err: &MigrateError) -> Self {
        Self {
            kind,
            source_issue,
            code: err.code(),
            message: err.to_string(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        let issue = self
            .source_issue
            .map_or_else(|| "<none>".to_string(), |id| format!("#{id}"));
        format!("{} for issue {issue}: {}", self.kind.as_str(), self.message)
    }
}

/// Project state machine.
///
/// `ListingProjects -> ProjectFound | ProjectNotFound`, then
/// `ProjectFound -> Phase1Creating -> Phase1Done -> Phase2Enriching ->
/// Phase2Done -> Phase3Relating -> ProjectComplete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPhase {
    ListingProjects,
    ProjectFound,
    ProjectNotFound,
    Phase1Creating,
    Phase1Done,
    Phase2Enriching,
    Phase2Done,
    Phase3Relating,
    ProjectComplete,
}

impl ProjectPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListingProjects => "listing_projects",
            Self::ProjectFound => "project_found",
            Self::ProjectNotFound => "project_not_found",
            Self::Phase1Creating => "phase1_creating",
            Self::Phase1Done => "phase1_done",
            Self::Phase2Enriching => "phase2_enriching",
            Self::Phase2Done => "phase2_done",
            Self::Phase3Relating => "phase3_relating",
            Self::ProjectComplete => "project_complete",
        }
    }

    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::ListingProjects,
                Self::ProjectFound | Self::ProjectNotFound
            ) | (Self::ProjectFound, Self::Phase1Creating)
                | (Self::Phase1Creating, Self::Phase1Done)
                | (Self::Phase1Done, Self::Phase2Enriching)
                | (Self::Phase2Enriching, Self::Phase2Done)
                | (Self::Phase2Done, Self::Phase3Relating)
                | (Self::Phase3Relating, Self::ProjectComplete)
        )
    }

    /// Terminal states.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::ProjectNotFound | Self::ProjectComplete)
    }
}

impl std::fmt::Display for ProjectPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectOutcome {
    Pending,
    Complete,
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    pub source_identifier: String,
    pub target_path: Option<String>,
    pub outcome: ProjectOutcome,
    /// Every phase entered, in order.
    pub phases: Vec<ProjectPhase>,
    pub issues_created: usize,
    pub notes_created: usize,
    pub events_created: usize,
    pub labels_created: usize,
    pub labels_attached: usize,
    pub attachments_stored: usize,
    pub relations_linked: usize,
    /// Redmine users routed to the default account for the first time.
    pub unmapped_users: usize,
    pub errors: Vec<RecordError>,
}

impl ProjectReport {
    #[must_use]
    pub fn new(source_identifier: impl Into<String>) -> Self {
        Self {
            source_identifier: source_identifier.into(),
            target_path: None,
            outcome: ProjectOutcome::Pending,
            phases: vec![ProjectPhase::ListingProjects],
            issues_created: 0,
            notes_created: 0,
            events_created: 0,
            labels_created: 0,
            labels_attached: 0,
            attachments_stored: 0,
            relations_linked: 0,
            unmapped_users: 0,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> ProjectPhase {
        self.phases
            .last()
            .copied()
            .unwrap_or(ProjectPhase::ListingProjects)
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn advance(&mut self, next: ProjectPhase) -> Result<()> {
        let current = self.phase();
        if !current.can_advance_to(next) {
            return Err(MigrateError::Internal(format!(
                "illegal phase transition {current} -> {next} for project {}",
                self.source_identifier
            )));
        }
        self.phases.push(next);
        match next {
            ProjectPhase::ProjectComplete => self.outcome = ProjectOutcome::Complete,
            ProjectPhase::ProjectNotFound => self.outcome = ProjectOutcome::NotFound,
            _ => {}
        }
        Ok(())
    }

    /// Keep a successful value, record a recoverable failure, or propagate a
    /// fatal one.
    pub fn absorb<V>(
        &mut self,
        kind: RecordKind,
        source_issue: Option<u64>,
        result: Result<V>,
    ) -> Result<Option<V>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                let record = RecordError::new(kind, source_issue, &err);
                if kind == RecordKind::Lookup {
                    warn!(
                        project = %self.source_identifier,
                        code = %record.code,
                        "Lookup failed, using fallback: {}",
                        record.summary()
                    );
                } else {
                    error!(
                        project = %self.source_identifier,
                        code = %record.code,
                        "Failed to save {}",
                        record.summary()
                    );
                }
                self.errors.push(record);
                Ok(None)
            }
        }
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Share of attempted writes that succeeded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        let total = self.issues_created
            + self.notes_created
            + self.labels_attached
            + self.attachments_stored
            + self.relations_linked;
        let failed = self.errors.len();
        if total + failed == 0 {
            1.0
        } else {
            total as f64 / (total + failed) as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub projects: Vec<ProjectReport>,
}

impl MigrationReport {
    #[must_use]
    pub fn issues_created(&self) -> usize {
        self.projects.iter().map(|p| p.issues_created).sum()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.projects.iter().map(|p| p.errors.len()).sum()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.projects.iter().any(ProjectReport::has_errors)
    }

    #[must_use]
    pub fn project(&self, identifier: &str) -> Option<&ProjectReport> {
        self.projects
            .iter()
            .find(|p| p.source_identifier == identifier)
    }
}

/// Progress notification for one processed issue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub phase: ProjectPhase,
    pub done: usize,
    /// Unknown while phase 1 is still paging.
    pub total: Option<usize>,
    pub percent: Option<f64>,
}

impl Progress {
    #[must_use]
    pub fn counting(phase: ProjectPhase, done: usize, total: Option<usize>) -> Self {
        Self {
            phase,
            done,
            total,
            percent: None,
        }
        .with_percent()
    }

    /// Progress derived from a display number and the project's iid offset.
    #[must_use]
    pub fn from_iid(phase: ProjectPhase, iid: u64, offset: u64, total: usize) -> Self {
        let done = usize::try_from(iid.saturating_sub(offset))
            .unwrap_or(usize::MAX)
            .min(total);
        Self::counting(phase, done, Some(total))
    }

    #[allow(clippy::cast_precision_loss)]
    fn with_percent(mut self) -> Self {
        if let Some(total) = self.total {
            self.percent = Some(if total == 0 {
                100.0
            } else {
                self.done as f64 * 100.0 / total as f64
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut report = ProjectReport::new("demo");
        for phase in [
            ProjectPhase::ProjectFound,
            ProjectPhase::Phase1Creating,
            ProjectPhase::Phase1Done,
            ProjectPhase::Phase2Enriching,
            ProjectPhase::Phase2Done,
            ProjectPhase::Phase3Relating,
            ProjectPhase::ProjectComplete,
        ] {
            report.advance(phase).expect("legal transition");
        }
        assert_eq!(report.outcome, ProjectOutcome::Complete);
        assert!(report.phase().is_final());
    }

    #[test]
    fn illegal_transition_is_internal_error() {
        let mut report = ProjectReport::new("demo");
        let err = report.advance(ProjectPhase::Phase2Enriching).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.code(), ErrorCode::Internal);

        report.advance(ProjectPhase::ProjectNotFound).unwrap();
        assert!(report.advance(ProjectPhase::ProjectFound).is_err());
        assert_eq!(report.outcome, ProjectOutcome::NotFound);
    }

    #[test]
    fn absorb_records_rejections_and_propagates_fatal() {
        let mut report = ProjectReport::new("demo");
        let rejected: Result<()> = Err(MigrateError::Rejected {
            resource: "note",
            status: 422,
            message: "too long".to_string(),
        });
        assert!(
            report
                .absorb(RecordKind::Note, Some(7), rejected)
                .unwrap()
                .is_none()
        );
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].source_issue, Some(7));

        let fatal: Result<()> = Err(MigrateError::Connectivity {
            host: "h".to_string(),
            reason: "reset".to_string(),
        });
        assert!(report.absorb(RecordKind::Issue, None, fatal).is_err());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn success_rate_counts_failures() {
        let mut report = ProjectReport::new("demo");
        assert!((report.success_rate() - 1.0).abs() < f64::EPSILON);
        report.issues_created = 3;
        report.errors.push(RecordError::new(
            RecordKind::Label,
            Some(1),
            &MigrateError::not_found("label", "x"),
        ));
        assert!((report.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn progress_from_iid_offset() {
        let progress = Progress::from_iid(ProjectPhase::Phase2Enriching, 15, 10, 10);
        assert_eq!(progress.done, 5);
        assert_eq!(progress.percent, Some(50.0));

        let overshoot = Progress::from_iid(ProjectPhase::Phase2Enriching, 99, 10, 10);
        assert_eq!(overshoot.done, 10);
    }
}
