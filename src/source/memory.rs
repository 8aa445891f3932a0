//! In-memory source.
//!
//! Holds pre-fetched Redmine records and answers the [`Source`] operations the
//! way the REST API would: list pages omit nested collections, and `get_issue`
//! returns only the requested includes. Every call is recorded so callers can
//! assert on access patterns (page offsets, cache hits).

use super::Source;
use crate::error::{MigrateError, Result};
use crate::model::{Include, NamedRecord, SourceIssue, SourceProject, SourceUser};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// A recorded source call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    TestConnection,
    ListProjects,
    ListIssues {
        project_id: u64,
        offset: usize,
        limit: usize,
    },
    GetIssue {
        id: u64,
        includes: Vec<Include>,
    },
    GetUser(u64),
    ListStatuses,
    ListTrackers,
    ListCategories(u64),
    Download(String),
}

#[derive(Debug, Clone)]
pub struct MemorySource {
    host: String,
    reachable: bool,
    projects: Vec<SourceProject>,
    issues: BTreeMap<u64, Vec<SourceIssue>>,
    users: HashMap<u64, SourceUser>,
    statuses: Vec<NamedRecord>,
    trackers: Vec<NamedRecord>,
    categories: HashMap<u64, Vec<NamedRecord>>,
    files: HashMap<String, Vec<u8>>,
    calls: Vec<SourceCall>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: "memory://redmine".to_string(),
            reachable: true,
            projects: Vec::new(),
            issues: BTreeMap::new(),
            users: HashMap::new(),
            statuses: Vec::new(),
            trackers: Vec::new(),
            categories: HashMap::new(),
            files: HashMap::new(),
            calls: Vec::new(),
        }
    }

    /// Make `test_connection` report a non-2xx answer.
    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn add_project(&mut self, project: SourceProject) {
        self.projects.push(project);
    }

    /// Add an issue with all of its nested collections.
    pub fn add_issue(&mut self, project_id: u64, issue: SourceIssue) {
        let issues = self.issues.entry(project_id).or_default();
        issues.push(issue);
        issues.sort_by_key(|issue| issue.id);
    }

    pub fn add_user(&mut self, user: SourceUser) {
        self.users.insert(user.id, user);
    }

    pub fn add_status(&mut self, id: u64, name: &str) {
        self.statuses.push(named(id, name));
    }

    pub fn add_tracker(&mut self, id: u64, name: &str) {
        self.trackers.push(named(id, name));
    }

    pub fn add_category(&mut self, project_id: u64, id: u64, name: &str) {
        self.categories
            .entry(project_id)
            .or_default()
            .push(named(id, name));
    }

    pub fn add_file(&mut self, url: &str, bytes: &[u8]) {
        self.files.insert(url.to_string(), bytes.to_vec());
    }

    #[must_use]
    pub fn calls(&self) -> &[SourceCall] {
        &self.calls
    }

    /// Number of recorded calls matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&SourceCall) -> bool) -> usize {
        self.calls.iter().filter(|call| pred(call)).count()
    }

    fn find_issue(&self, id: u64) -> Option<&SourceIssue> {
        self.issues.values().flatten().find(|issue| issue.id == id)
    }
}

fn named(id: u64, name: &str) -> NamedRecord {
    NamedRecord {
        id,
        name: name.to_string(),
    }
}

/// Copy of `issue` carrying only the requested nested collections.
fn with_includes(issue: &SourceIssue, includes: &[Include]) -> SourceIssue {
    let mut copy = issue.clone();
    if !includes.contains(&Include::Journals) {
        copy.journals.clear();
    }
    if !includes.contains(&Include::Children) {
        copy.children.clear();
    }
    if !includes.contains(&Include::Attachments) {
        copy.attachments.clear();
    }
    if !includes.contains(&Include::Relations) {
        copy.relations.clear();
    }
    if !includes.contains(&Include::Changesets) {
        copy.changesets.clear();
    }
    copy
}

impl Source for MemorySource {
    fn host(&self) -> &str {
        &self.host
    }

    fn test_connection(&mut self) -> Result<bool> {
        self.calls.push(SourceCall::TestConnection);
        Ok(self.reachable)
    }

    fn list_projects(&mut self) -> Result<Vec<SourceProject>> {
        self.calls.push(SourceCall::ListProjects);
        Ok(self.projects.clone())
    }

    fn list_issues(
        &mut self,
        project_id: u64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SourceIssue>> {
        self.calls.push(SourceCall::ListIssues {
            project_id,
            offset,
            limit,
        });
        let page = self
            .issues
            .get(&project_id)
            .map(|issues| {
                issues
                    .iter()
                    .skip(offset)
                    .take(limit)
                    .map(|issue| with_includes(issue, &[]))
                    .collect()
            })
            .unwrap_or_default();
        Ok(page)
    }

    fn get_issue(&mut self, id: u64, includes: &[Include]) -> Result<Option<SourceIssue>> {
        self.calls.push(SourceCall::GetIssue {
            id,
            includes: includes.to_vec(),
        });
        Ok(self.find_issue(id).map(|issue| with_includes(issue, includes)))
    }

    fn get_user(&mut self, id: u64) -> Result<Option<SourceUser>> {
        self.calls.push(SourceCall::GetUser(id));
        Ok(self.users.get(&id).cloned())
    }

    fn list_statuses(&mut self) -> Result<Vec<NamedRecord>> {
        self.calls.push(SourceCall::ListStatuses);
        Ok(self.statuses.clone())
    }

    fn list_trackers(&mut self) -> Result<Vec<NamedRecord>> {
        self.calls.push(SourceCall::ListTrackers);
        Ok(self.trackers.clone())
    }

    fn list_categories(&mut self, project_id: u64) -> Result<Vec<NamedRecord>> {
        self.calls.push(SourceCall::ListCategories(project_id));
        Ok(self.categories.get(&project_id).cloned().unwrap_or_default())
    }

    fn download(&mut self, url: &str, dest: &Path) -> Result<u64> {
        self.calls.push(SourceCall::Download(url.to_string()));
        let bytes = self
            .files
            .get(url)
            .ok_or_else(|| MigrateError::not_found("attachment", url))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, bytes)?;
        Ok(bytes.len() as u64)
    }
}
