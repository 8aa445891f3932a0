//! Read-only access to the Redmine side.
//!
//! # Submodules
//!
//! - [`redmine`] - REST client (API key header, JSON envelopes)
//! - [`memory`] - In-memory source for offline runs and tests

pub mod memory;
pub mod redmine;

pub use memory::{MemorySource, SourceCall};
pub use redmine::RedmineClient;

use crate::error::Result;
use crate::model::{Include, NamedRecord, SourceIssue, SourceProject, SourceUser};
use std::path::Path;

/// Redmine resource kinds and their JSON envelope keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Project,
    Issue,
    User,
    IssueStatus,
    Tracker,
    IssueCategory,
}

impl ResourceKind {
    /// Singular key wrapping a `GET /<plural>/<id>.json` response.
    #[must_use]
    pub const fn resource_name(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Issue => "issue",
            Self::User => "user",
            Self::IssueStatus => "issue_status",
            Self::Tracker => "tracker",
            Self::IssueCategory => "issue_category",
        }
    }

    /// Plural key wrapping list responses; also the URL segment.
    #[must_use]
    pub const fn pluralized(self) -> &'static str {
        match self {
            Self::Project => "projects",
            Self::Issue => "issues",
            Self::User => "users",
            Self::IssueStatus => "issue_statuses",
            Self::Tracker => "trackers",
            Self::IssueCategory => "issue_categories",
        }
    }
}

/// Operations the migration needs from the source tracker.
///
/// Lookups that can legitimately miss return `Ok(None)`; errors are reserved
/// for transport and protocol failures.
pub trait Source {
    /// Host used in diagnostics.
    fn host(&self) -> &str;

    /// `true` when the host answers `GET /` with a 2xx/3xx status.
    fn test_connection(&mut self) -> Result<bool>;

    fn list_projects(&mut self) -> Result<Vec<SourceProject>>;

    /// One page of a project's issues (all statuses, no subprojects, id order).
    fn list_issues(
        &mut self,
        project_id: u64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SourceIssue>>;

    fn get_issue(&mut self, id: u64, includes: &[Include]) -> Result<Option<SourceIssue>>;

    fn get_user(&mut self, id: u64) -> Result<Option<SourceUser>>;

    fn list_statuses(&mut self) -> Result<Vec<NamedRecord>>;

    fn list_trackers(&mut self) -> Result<Vec<NamedRecord>>;

    fn list_categories(&mut self, project_id: u64) -> Result<Vec<NamedRecord>>;

    /// Stream an attachment to `dest`, returning the number of bytes written.
    fn download(&mut self, url: &str, dest: &Path) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irregular_plurals() {
        assert_eq!(ResourceKind::IssueStatus.pluralized(), "issue_statuses");
        assert_eq!(ResourceKind::IssueCategory.pluralized(), "issue_categories");
        assert_eq!(ResourceKind::IssueCategory.resource_name(), "issue_category");
        assert_eq!(ResourceKind::Project.pluralized(), "projects");
    }
}
