//! In-memory target.
//!
//! Mimics the GitLab behaviors the migration relies on: per-project iid
//! sequences, exact-title labels, note/event linking, and rejected writes.

use super::Target;
use crate::error::{MigrateError, Result};
use crate::model::{
    Event, EventAction, EventTarget, IssueState, Label, NewEvent, NewIssue, NewNote, Note,
    TargetIssue, TargetProject, TargetUser,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct MemoryTarget {
    host: String,
    projects: Vec<TargetProject>,
    users: HashMap<u64, TargetUser>,
    labels: HashMap<u64, Vec<Label>>,
    issues: Vec<TargetIssue>,
    notes: Vec<Note>,
    events: Vec<Event>,
    next_id: u64,
    next_iid: HashMap<u64, u64>,
    label_creations: usize,
    reject_notes_containing: Option<String>,
    reject_labels_containing: Option<String>,
}

impl Default for MemoryTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTarget {
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: "memory://gitlab".to_string(),
            projects: Vec::new(),
            users: HashMap::new(),
            labels: HashMap::new(),
            issues: Vec::new(),
            notes: Vec::new(),
            events: Vec::new(),
            next_id: 1,
            next_iid: HashMap::new(),
            label_creations: 0,
            reject_notes_containing: None,
            reject_labels_containing: None,
        }
    }

    /// Register a project and return it.
    pub fn add_project(&mut self, name: &str, path_with_namespace: &str) -> TargetProject {
        let project = TargetProject {
            id: self.allocate_id(),
            name: name.to_string(),
            path_with_namespace: path_with_namespace.to_string(),
        };
        self.projects.push(project.clone());
        project
    }

    pub fn add_user(&mut self, id: u64, username: &str) {
        self.users.insert(
            id,
            TargetUser {
                id,
                username: username.to_string(),
                name: username.to_string(),
            },
        );
    }

    /// Seed a label that exists before the run.
    pub fn add_label(&mut self, project_id: u64, title: &str, color: Option<&str>) -> Label {
        let label = Label {
            id: self.allocate_id(),
            title: title.to_string(),
            color: color.map(str::to_string),
        };
        self.labels
            .entry(project_id)
            .or_default()
            .push(label.clone());
        label
    }

    /// Start a project's automatic iid sequence at `iid`.
    pub fn set_next_iid(&mut self, project_id: u64, iid: u64) {
        self.next_iid.insert(project_id, iid);
    }

    /// Reject note creation when the body contains `marker`.
    pub fn reject_notes_containing(&mut self, marker: &str) {
        self.reject_notes_containing = Some(marker.to_string());
    }

    /// Reject label creation when the title contains `marker`.
    pub fn reject_labels_containing(&mut self, marker: &str) {
        self.reject_labels_containing = Some(marker.to_string());
    }

    #[must_use]
    pub fn issues(&self) -> &[TargetIssue] {
        &self.issues
    }

    #[must_use]
    pub fn issue(&self, id: u64) -> Option<&TargetIssue> {
        self.issues.iter().find(|issue| issue.id == id)
    }

    #[must_use]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Notes on one issue in creation order.
    #[must_use]
    pub fn notes_for(&self, issue_id: u64) -> Vec<&Note> {
        self.notes
            .iter()
            .filter(|note| note.issue_id == issue_id)
            .collect()
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[must_use]
    pub fn events_for(&self, issue_id: u64, action: EventAction) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|event| event.target.issue_id() == issue_id && event.action == action)
            .collect()
    }

    #[must_use]
    pub fn labels(&self, project_id: u64) -> &[Label] {
        self.labels.get(&project_id).map_or(&[], Vec::as_slice)
    }

    /// Labels created through [`Target::create_label`].
    #[must_use]
    pub const fn label_creations(&self) -> usize {
        self.label_creations
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn issue_mut(&mut self, issue: &TargetIssue) -> Result<&mut TargetIssue> {
        self.issues
            .iter_mut()
            .find(|stored| stored.id == issue.id)
            .ok_or_else(|| MigrateError::not_found("issue", issue.id.to_string()))
    }

    fn touch(issue: &mut TargetIssue, at: DateTime<Utc>) {
        if at > issue.updated_at {
            issue.updated_at = at;
        }
    }
}

fn rejected(resource: &'static str, status: u16, message: impl Into<String>) -> MigrateError {
    MigrateError::Rejected {
        resource,
        status,
        message: message.into(),
    }
}

impl Target for MemoryTarget {
    fn host(&self) -> &str {
        &self.host
    }

    fn find_project(&mut self, name_or_path: &str) -> Result<Option<TargetProject>> {
        let by_path = name_or_path.contains('/');
        Ok(self
            .projects
            .iter()
            .find(|project| {
                if by_path {
                    project.path_with_namespace == name_or_path
                } else {
                    project.name == name_or_path
                }
            })
            .cloned())
    }

    fn find_user(&mut self, id: u64) -> Result<Option<TargetUser>> {
        Ok(self.users.get(&id).cloned())
    }

    fn find_label(&mut self, project: &TargetProject, title: &str) -> Result<Option<Label>> {
        Ok(self
            .labels(project.id)
            .iter()
            .find(|label| label.title == title)
            .cloned())
    }

    fn create_label(
        &mut self,
        project: &TargetProject,
        title: &str,
        color: Option<&str>,
    ) -> Result<Label> {
        if self
            .reject_labels_containing
            .as_deref()
            .is_some_and(|marker| title.contains(marker))
        {
            return Err(rejected("label", 400, format!("invalid title {title:?}")));
        }
        if self
            .labels(project.id)
            .iter()
            .any(|label| label.title == title)
        {
            return Err(rejected("label", 409, "Label already exists"));
        }
        self.label_creations += 1;
        let color = color.unwrap_or(super::DEFAULT_LABEL_COLOR);
        Ok(self.add_label(project.id, title, Some(color)))
    }

    fn create_issue(&mut self, project: &TargetProject, issue: &NewIssue) -> Result<TargetIssue> {
        let next = self.next_iid.get(&project.id).copied().unwrap_or(1);
        let iid = issue.iid.unwrap_or(next);
        if self
            .issues
            .iter()
            .any(|stored| stored.project_id == project.id && stored.iid == iid)
        {
            return Err(rejected("issue", 409, format!("iid {iid} is already taken")));
        }
        self.next_iid.insert(project.id, next.max(iid + 1));

        let created = TargetIssue {
            id: self.allocate_id(),
            iid,
            project_id: project.id,
            title: issue.title.clone(),
            state: IssueState::Opened,
            author_id: issue.author_id,
            assignee_id: issue.assignee_id,
            description: issue.description.clone(),
            labels: Vec::new(),
            created_at: issue.created_at,
            updated_at: issue.updated_at,
        };
        self.issues.push(created.clone());
        Ok(created)
    }

    fn set_state(
        &mut self,
        _project: &TargetProject,
        issue: &TargetIssue,
        state: IssueState,
    ) -> Result<()> {
        self.issue_mut(issue)?.state = state;
        Ok(())
    }

    fn update_description(
        &mut self,
        _project: &TargetProject,
        issue: &TargetIssue,
        description: &str,
    ) -> Result<()> {
        self.issue_mut(issue)?.description = description.to_string();
        Ok(())
    }

    fn update_labels(
        &mut self,
        _project: &TargetProject,
        issue: &TargetIssue,
        add: &[Label],
        remove: &[Label],
    ) -> Result<Vec<String>> {
        let stored = self.issue_mut(issue)?;
        stored
            .labels
            .retain(|title| !remove.iter().any(|label| &label.title == title));
        for label in add {
            if !stored.labels.contains(&label.title) {
                stored.labels.push(label.title.clone());
            }
        }
        Ok(stored.labels.clone())
    }

    fn create_note(
        &mut self,
        _project: &TargetProject,
        issue: &TargetIssue,
        note: &NewNote,
    ) -> Result<Note> {
        if self
            .reject_notes_containing
            .as_deref()
            .is_some_and(|marker| note.body.contains(marker))
        {
            return Err(rejected("note", 400, "note body rejected"));
        }
        let created = Note {
            id: self.allocate_id(),
            issue_id: issue.id,
            body: note.body.clone(),
            author_id: note.author_id,
            created_at: note.created_at,
            updated_at: note.created_at,
            system: note.system,
            event_id: None,
        };
        Self::touch(self.issue_mut(issue)?, note.created_at);
        self.notes.push(created.clone());
        Ok(created)
    }

    fn create_event(&mut self, _project: &TargetProject, event: &NewEvent) -> Result<Event> {
        let id = self.allocate_id();
        if let EventTarget::Note { note_id, .. } = event.target {
            let note = self
                .notes
                .iter_mut()
                .find(|note| note.id == note_id)
                .ok_or_else(|| MigrateError::not_found("note", note_id.to_string()))?;
            note.event_id = Some(id);
        }
        let created = Event {
            id: Some(id),
            action: event.action,
            target: event.target,
            author_id: event.author_id,
            created_at: event.created_at,
        };
        self.events.push(created.clone());
        Ok(created)
    }
}
