//! The two-phase migration engine.
//!
//! Phase 1 creates one GitLab issue per Redmine issue and records the id
//! translation. Phase 2 replays each issue's journals and attaches files,
//! child tables and commit mentions. Phase 3 links relations once every issue
//! in the project has a GitLab counterpart.
//!
//! # Submodules
//!
//! - [`cache`] - Memoized lookups (users, statuses, trackers, categories)
//! - [`translate`] - Source id -> target issue table
//! - [`users`] - Conversion-table user routing
//! - [`labels`] - Label find-or-create
//! - [`journal`] - Journal replay
//! - [`enrich`] - Attachments, children, changesets, relations
//! - [`report`] - Per-project reports and progress

pub mod cache;
pub mod enrich;
pub mod journal;
pub mod labels;
pub mod report;
pub mod translate;
pub mod users;

pub use cache::{Lookup, Memo, ResourceCache};
pub use journal::FieldHistory;
pub use labels::{CATEGORY_COLOR, LabelRegistry, normalize_title};
pub use report::{
    MigrationReport, Progress, ProjectOutcome, ProjectPhase, ProjectReport, RecordError,
    RecordKind,
};
pub use translate::IdentifierTranslator;
pub use users::{Resolution, UserResolver};

use crate::config::{IidField, MigrationConfig};
use crate::error::{MigrateError, Result};
use crate::format;
use crate::model::{
    EventAction, EventTarget, Include, IssueState, Label, NewEvent, NewIssue, NewNote, Note,
    SourceIssue, SourceProject, SourceUser, TargetIssue, TargetProject, TargetUser, UserRef,
};
use crate::source::Source;
use crate::target::Target;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Includes fetched for phase 2.
pub const ENRICH_INCLUDES: [Include; 4] = [
    Include::Journals,
    Include::Children,
    Include::Attachments,
    Include::Changesets,
];

/// Includes fetched for phase 3.
pub const RELATION_INCLUDES: [Include; 1] = [Include::Relations];

/// How one Redmine project maps onto GitLab, as reported by `check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectMapping {
    pub source_identifier: String,
    /// Configured target name or path; `None` when the mapping table skips it.
    pub target_path: Option<String>,
    pub target_id: Option<u64>,
}

/// Runs the migration for every selected project.
///
/// Per-run state (caches, user seen-sets, label registry) lives here and is
/// lent to each project's [`ProjectContext`].
pub struct Migrator<S, T> {
    source: S,
    target: T,
    config: MigrationConfig,
    cache: ResourceCache,
    users: UserResolver,
    labels: LabelRegistry,
}

impl<S: Source, T: Target> Migrator<S, T> {
    #[must_use]
    pub fn new(source: S, target: T, config: MigrationConfig) -> Self {
        let users = UserResolver::new(&config.users);
        Self {
            source,
            target,
            config,
            cache: ResourceCache::new(),
            users,
            labels: LabelRegistry::new(),
        }
    }

    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub const fn target(&self) -> &T {
        &self.target
    }

    #[must_use]
    pub const fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn into_parts(self) -> (S, T) {
        (self.source, self.target)
    }

    fn ensure_connection(&mut self) -> Result<()> {
        if self.source.test_connection()? {
            info!(host = %self.source.host(), "Connection established");
            Ok(())
        } else {
            Err(MigrateError::Connectivity {
                host: self.source.host().to_string(),
                reason: "connection test returned an error status".to_string(),
            })
        }
    }

    /// Test the source connection and resolve each project's target without
    /// writing anything.
    pub fn check(&mut self) -> Result<Vec<ProjectMapping>> {
        self.config.validate()?;
        self.ensure_connection()?;
        let mut mappings = Vec::new();
        for project in self.source.list_projects()? {
            if !self.config.includes_project(&project.identifier) {
                continue;
            }
            let target_path = self
                .config
                .target_project_for(&project.identifier)
                .map(str::to_string);
            let target_id = match target_path.as_deref() {
                Some(path) => self.target.find_project(path)?.map(|found| found.id),
                None => None,
            };
            mappings.push(ProjectMapping {
                source_identifier: project.identifier,
                target_path,
                target_id,
            });
        }
        Ok(mappings)
    }

    pub fn run(&mut self) -> Result<MigrationReport> {
        self.run_with_progress(&mut |_: &Progress| {})
    }

    /// Migrate every selected project, reporting per-issue progress.
    ///
    /// Fatal errors abort the run; everything else ends up in the report.
    pub fn run_with_progress(
        &mut self,
        progress: &mut dyn FnMut(&Progress),
    ) -> Result<MigrationReport> {
        self.config.validate()?;
        self.ensure_connection()?;
        let projects = self.source.list_projects()?;
        debug!(count = projects.len(), "Listed source projects");

        let mut report = MigrationReport::default();
        for project in projects {
            if !self.config.includes_project(&project.identifier) {
                debug!(project = %project.identifier, "Skipped by project filter");
                continue;
            }
            report
                .projects
                .push(self.migrate_project(&project, progress)?);
        }
        Ok(report)
    }

    fn migrate_project(
        &mut self,
        project: &SourceProject,
        progress: &mut dyn FnMut(&Progress),
    ) -> Result<ProjectReport> {
        let mut report = ProjectReport::new(&project.identifier);
        let Some(path) = self.config.target_project_for(&project.identifier) else {
            warn!(project = %project.identifier, "Project has no entry in the mapping table");
            report.advance(ProjectPhase::ProjectNotFound)?;
            return Ok(report);
        };
        report.target_path = Some(path.to_string());
        let found = self.target.find_project(path);
        let Some(target_project) = report
            .absorb(RecordKind::Lookup, None, found)?
            .flatten()
        else {
            warn!(project = %project.identifier, target = path, "Project not found on target");
            report.advance(ProjectPhase::ProjectNotFound)?;
            return Ok(report);
        };
        info!(
            target = %target_project.path_with_namespace,
            source = %project.name,
            "Found project"
        );
        report.advance(ProjectPhase::ProjectFound)?;

        let labels_before = self.labels.created();
        let warnings_before = self.users.warnings();
        let mut translator = IdentifierTranslator::new();
        let mut ctx = ProjectContext {
            source: &mut self.source,
            target: &mut self.target,
            config: &self.config,
            cache: &mut self.cache,
            users: &mut self.users,
            labels: &mut self.labels,
            translator: &mut translator,
            report: &mut report,
            project: &target_project,
            source_project_id: project.id,
            iid_offset: None,
        };
        ctx.create_issues(progress)?;
        ctx.enrich_issues(progress)?;
        ctx.relate_issues(progress)?;

        report.labels_created = self.labels.created() - labels_before;
        report.unmapped_users = self.users.warnings() - warnings_before;
        info!(
            project = %report.source_identifier,
            issues = report.issues_created,
            notes = report.notes_created,
            errors = report.errors.len(),
            "Project migrated"
        );
        Ok(report)
    }
}

/// Everything one project's phases read and write.
pub struct ProjectContext<'a, S, T> {
    pub source: &'a mut S,
    pub target: &'a mut T,
    pub config: &'a MigrationConfig,
    pub cache: &'a mut ResourceCache,
    pub users: &'a mut UserResolver,
    pub labels: &'a mut LabelRegistry,
    pub translator: &'a mut IdentifierTranslator,
    pub report: &'a mut ProjectReport,
    pub project: &'a TargetProject,
    pub source_project_id: u64,
    /// First created iid minus one.
    pub iid_offset: Option<u64>,
}

impl<S: Source, T: Target> ProjectContext<'_, S, T> {
    /// Phase 1: page through the project's issues and create each one.
    pub fn create_issues(&mut self, progress: &mut dyn FnMut(&Progress)) -> Result<()> {
        self.report.advance(ProjectPhase::Phase1Creating)?;
        let page_size = self.config.page_size;
        let mut offset = 0;
        let mut done = 0;
        loop {
            let page = self
                .source
                .list_issues(self.source_project_id, offset, page_size);
            let Some(page) = self.report.absorb(RecordKind::Lookup, None, page)? else {
                warn!(offset, "Issue page unreadable, continuing with the issues created so far");
                break;
            };
            let fetched = page.len();
            debug!(offset, fetched, "Fetched issue page");
            for issue in &page {
                self.create_issue(issue)?;
                done += 1;
                progress(&Progress::counting(ProjectPhase::Phase1Creating, done, None));
            }
            if fetched < page_size {
                break;
            }
            offset += page_size;
        }
        self.report.advance(ProjectPhase::Phase1Done)
    }

    /// Phase 2: replay history and attach everything that hangs off an issue.
    pub fn enrich_issues(&mut self, progress: &mut dyn FnMut(&Progress)) -> Result<()> {
        self.report.advance(ProjectPhase::Phase2Enriching)?;
        let ids = self.translator.source_ids().to_vec();
        let total = ids.len();
        let offset = self.iid_offset.unwrap_or(0);
        for id in ids {
            if let Some(issue) = self.fetch_issue(id, &ENRICH_INCLUDES)? {
                let history = self.replay_journals(&issue)?;
                self.attach_files(&issue)?;
                self.link_children(&issue)?;
                self.mention_changesets(&issue)?;
                self.apply_current_values(&issue, &history)?;
            }
            let iid = self.translator.lookup(id).map_or(0, |issue| issue.iid);
            progress(&Progress::from_iid(
                ProjectPhase::Phase2Enriching,
                iid,
                offset,
                total,
            ));
        }
        self.report.advance(ProjectPhase::Phase2Done)
    }

    /// Phase 3: relation tables, once every issue has a target number.
    pub fn relate_issues(&mut self, progress: &mut dyn FnMut(&Progress)) -> Result<()> {
        self.report.advance(ProjectPhase::Phase3Relating)?;
        let ids = self.translator.source_ids().to_vec();
        let total = ids.len();
        for (index, id) in ids.into_iter().enumerate() {
            if let Some(issue) = self.fetch_issue(id, &RELATION_INCLUDES)? {
                self.link_relations(&issue)?;
            }
            progress(&Progress::counting(
                ProjectPhase::Phase3Relating,
                index + 1,
                Some(total),
            ));
        }
        self.report.advance(ProjectPhase::ProjectComplete)
    }

    fn fetch_issue(&mut self, id: u64, includes: &[Include]) -> Result<Option<SourceIssue>> {
        let fetched = self.source.get_issue(id, includes);
        let fetched = self
            .report
            .absorb(RecordKind::Issue, Some(id), fetched)?
            .flatten();
        if fetched.is_none() {
            warn!(source_issue = id, "Issue disappeared from source");
        }
        Ok(fetched)
    }

    /// Create the target issue for one listed source issue.
    pub fn create_issue(&mut self, issue: &SourceIssue) -> Result<()> {
        let author = self.users.resolve(&issue.author);
        let assignee = issue
            .assignee
            .as_ref()
            .map(|user| (user, self.users.resolve(user)));

        let created_by = if author.defaulted {
            Some(self.display_name(issue.id, &issue.author)?)
        } else {
            None
        };
        let assigned_to = match assignee {
            Some((user, resolution)) if resolution.defaulted => {
                Some(self.display_name(issue.id, user)?)
            }
            _ => None,
        };
        let description = format::render_description(
            issue.description.as_deref(),
            created_by.as_deref(),
            assigned_to.as_deref(),
        );

        let request = NewIssue {
            title: issue.subject.clone(),
            description,
            author_id: author.account_id,
            assignee_id: assignee
                .filter(|(_, resolution)| !resolution.defaulted)
                .map(|(_, resolution)| resolution.account_id),
            created_at: issue.created_on,
            updated_at: issue.updated_on,
            iid: self.config.iid_field.map(|field| match field {
                IidField::Id => issue.id,
            }),
        };
        let created = self.target.create_issue(self.project, &request);
        let Some(mut created) = self
            .report
            .absorb(RecordKind::Issue, Some(issue.id), created)?
        else {
            return Ok(());
        };
        self.report.issues_created += 1;
        info!(
            source_issue = issue.id,
            iid = created.iid,
            title = %created.title,
            "New issue"
        );
        if self.iid_offset.is_none() {
            self.iid_offset = Some(created.iid.saturating_sub(1));
        }

        if !self.config.statuses.is_open(&issue.status.name) {
            let closed = self
                .target
                .set_state(self.project, &created, IssueState::Closed);
            if self
                .report
                .absorb(RecordKind::Issue, Some(issue.id), closed)?
                .is_some()
            {
                created.state = IssueState::Closed;
            }
        }

        self.emit_event(
            issue.id,
            EventAction::Created,
            EventTarget::Issue {
                issue_id: created.id,
            },
            author.account_id,
            issue.created_on,
        )?;
        self.translator.record(issue.id, created);
        Ok(())
    }

    /// Human-readable name for a Redmine user reference.
    pub fn display_name(&mut self, source_issue: u64, user: &UserRef) -> Result<String> {
        if !user.name.trim().is_empty() {
            return Ok(user.name.clone());
        }
        Ok(self
            .source_user(source_issue, user.id)?
            .map_or_else(|| format::unknown_user(user.id), |found| found.display_name()))
    }

    /// Redmine user record; `None` when missing or unreadable.
    pub fn source_user(&mut self, source_issue: u64, id: u64) -> Result<Option<SourceUser>> {
        let user = self.cache.source_user(&mut *self.source, id);
        Ok(self
            .report
            .absorb(RecordKind::Lookup, Some(source_issue), user)?
            .flatten())
    }

    /// GitLab account; `None` when missing or unreadable.
    pub fn target_user(&mut self, source_issue: u64, id: u64) -> Result<Option<TargetUser>> {
        let user = self.cache.target_user(&mut *self.target, id);
        Ok(self
            .report
            .absorb(RecordKind::Lookup, Some(source_issue), user)?
            .flatten())
    }

    /// Name from a lookup table; `None` when unknown or the table is unreadable.
    pub fn lookup_name(
        &mut self,
        source_issue: u64,
        lookup: Lookup,
        id: u64,
    ) -> Result<Option<String>> {
        let name = self.cache.name(&mut *self.source, lookup, id);
        Ok(self
            .report
            .absorb(RecordKind::Lookup, Some(source_issue), name)?
            .flatten())
    }

    /// Create a note; `commented` adds a linked `commented` event.
    pub fn post_note(
        &mut self,
        source_issue: u64,
        issue: &TargetIssue,
        note: NewNote,
        commented: bool,
    ) -> Result<Option<Note>> {
        let created = self.target.create_note(self.project, issue, &note);
        let Some(created) = self
            .report
            .absorb(RecordKind::Note, Some(source_issue), created)?
        else {
            return Ok(None);
        };
        self.report.notes_created += 1;
        if commented {
            self.emit_event(
                source_issue,
                EventAction::Commented,
                EventTarget::Note {
                    issue_id: issue.id,
                    note_id: created.id,
                },
                note.author_id,
                note.created_at,
            )?;
        }
        Ok(Some(created))
    }

    pub fn emit_event(
        &mut self,
        source_issue: u64,
        action: EventAction,
        target: EventTarget,
        author_id: u64,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let event = NewEvent {
            action,
            target,
            author_id,
            created_at,
        };
        let created = self.target.create_event(self.project, &event);
        if self
            .report
            .absorb(RecordKind::Event, Some(source_issue), created)?
            .is_some()
        {
            self.report.events_created += 1;
        }
        Ok(())
    }

    /// Label for `title`, or `None` when the registry could not provide one.
    pub fn label(
        &mut self,
        source_issue: u64,
        title: &str,
        color: Option<&str>,
    ) -> Result<Option<Label>> {
        let label = self.labels
            .ensure(&mut *self.target, self.project, title, color);
        self.report
            .absorb(RecordKind::Label, Some(source_issue), label)
    }

    /// Attach and detach labels, keeping the translated copy in sync.
    pub fn apply_labels(
        &mut self,
        source_issue: u64,
        add: &[Label],
        remove: &[Label],
    ) -> Result<()> {
        if add.is_empty() && remove.is_empty() {
            return Ok(());
        }
        let mut issue = self.translator.expect_issue(source_issue)?;
        let updated = self.target.update_labels(self.project, &issue, add, remove);
        if let Some(labels) = self
            .report
            .absorb(RecordKind::Label, Some(source_issue), updated)?
        {
            self.report.labels_attached += add.len();
            issue.labels = labels;
            self.translator.update(source_issue, issue)?;
        }
        Ok(())
    }

    /// Write a new description, keeping the translated copy in sync.
    pub fn replace_description(&mut self, source_issue: u64, description: String) -> Result<bool> {
        let mut issue = self.translator.expect_issue(source_issue)?;
        if issue.description == description {
            return Ok(true);
        }
        let updated = self
            .target
            .update_description(self.project, &issue, &description);
        if self
            .report
            .absorb(RecordKind::Description, Some(source_issue), updated)?
            .is_none()
        {
            return Ok(false);
        }
        issue.description = description;
        self.translator.update(source_issue, issue)?;
        Ok(true)
    }
}
