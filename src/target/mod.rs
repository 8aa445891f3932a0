//! Write access to the GitLab side.
//!
//! # Submodules
//!
//! - [`gitlab`] - REST v4 client (private token, sudo impersonation)
//! - [`memory`] - In-memory target for offline runs and tests

pub mod gitlab;
pub mod memory;

pub use gitlab::GitlabClient;
pub use memory::MemoryTarget;

use crate::error::Result;
use crate::model::{
    Event, IssueState, Label, NewEvent, NewIssue, NewNote, Note, TargetIssue, TargetProject,
    TargetUser,
};

/// Color GitLab assigns when a label is created without one.
pub const DEFAULT_LABEL_COLOR: &str = "#428BCA";

/// Operations the migration performs against the target tracker.
///
/// Writes that the target refuses fail with [`crate::MigrateError::Rejected`];
/// callers treat those as per-record failures.
pub trait Target {
    /// Host used in diagnostics.
    fn host(&self) -> &str;

    /// Find a project by full path (`group/name`) or, without a slash, by name.
    fn find_project(&mut self, name_or_path: &str) -> Result<Option<TargetProject>>;

    fn find_user(&mut self, id: u64) -> Result<Option<TargetUser>>;

    /// Exact-title label lookup within a project.
    fn find_label(&mut self, project: &TargetProject, title: &str) -> Result<Option<Label>>;

    fn create_label(
        &mut self,
        project: &TargetProject,
        title: &str,
        color: Option<&str>,
    ) -> Result<Label>;

    fn create_issue(&mut self, project: &TargetProject, issue: &NewIssue) -> Result<TargetIssue>;

    fn set_state(
        &mut self,
        project: &TargetProject,
        issue: &TargetIssue,
        state: IssueState,
    ) -> Result<()>;

    fn update_description(
        &mut self,
        project: &TargetProject,
        issue: &TargetIssue,
        description: &str,
    ) -> Result<()>;

    /// Attach `add` and detach `remove`, returning the resulting label titles.
    fn update_labels(
        &mut self,
        project: &TargetProject,
        issue: &TargetIssue,
        add: &[Label],
        remove: &[Label],
    ) -> Result<Vec<String>>;

    fn create_note(
        &mut self,
        project: &TargetProject,
        issue: &TargetIssue,
        note: &NewNote,
    ) -> Result<Note>;

    fn create_event(&mut self, project: &TargetProject, event: &NewEvent) -> Result<Event>;
}
