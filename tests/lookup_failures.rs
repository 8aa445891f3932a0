mod common;

use common::*;
use redmine2gitlab::migrate::{Migrator, ProjectOutcome, RecordKind};
use redmine2gitlab::model::{
    EventAction, Include, NamedRecord, SourceIssue, SourceProject, SourceUser,
};
use redmine2gitlab::source::{MemorySource, Source};
use redmine2gitlab::{ErrorCode, MigrateError, Result};
use std::path::Path;

/// Memory source whose user and status reads can be switched to 403s.
struct Forbidding {
    inner: MemorySource,
    users: bool,
    statuses: bool,
    refused: Vec<String>,
}

impl Forbidding {
    fn new(inner: MemorySource) -> Self {
        Self {
            inner,
            users: false,
            statuses: false,
            refused: Vec::new(),
        }
    }

    fn refuse(&mut self, what: String) -> MigrateError {
        self.refused.push(what);
        MigrateError::Rejected {
            resource: "redmine request",
            status: 403,
            message: "forbidden".to_string(),
        }
    }
}

impl Source for Forbidding {
    fn host(&self) -> &str {
        self.inner.host()
    }

    fn test_connection(&mut self) -> Result<bool> {
        self.inner.test_connection()
    }

    fn list_projects(&mut self) -> Result<Vec<SourceProject>> {
        self.inner.list_projects()
    }

    fn list_issues(
        &mut self,
        project_id: u64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SourceIssue>> {
        self.inner.list_issues(project_id, offset, limit)
    }

    fn get_issue(&mut self, id: u64, includes: &[Include]) -> Result<Option<SourceIssue>> {
        self.inner.get_issue(id, includes)
    }

    fn get_user(&mut self, id: u64) -> Result<Option<SourceUser>> {
        if self.users {
            return Err(self.refuse(format!("user {id}")));
        }
        self.inner.get_user(id)
    }

    fn list_statuses(&mut self) -> Result<Vec<NamedRecord>> {
        if self.statuses {
            return Err(self.refuse("statuses".to_string()));
        }
        self.inner.list_statuses()
    }

    fn list_trackers(&mut self) -> Result<Vec<NamedRecord>> {
        self.inner.list_trackers()
    }

    fn list_categories(&mut self, project_id: u64) -> Result<Vec<NamedRecord>> {
        self.inner.list_categories(project_id)
    }

    fn download(&mut self, url: &str, dest: &Path) -> Result<u64> {
        self.inner.download(url, dest)
    }
}

#[test]
fn forbidden_user_reads_fall_back_to_redmine_ids() {
    init_test_logging();
    let mut source = demo_source();
    source.add_user(SourceUser {
        id: 98,
        login: "yan".to_string(),
        firstname: "Yan".to_string(),
        lastname: "Helper".to_string(),
        mail: None,
    });
    let mut handover = issue(1, "Handover");
    handover.journals = vec![
        journal(11, ann(), ts(2, 9), vec![attr("assigned_to_id", Some("98"), Some("77"))]),
        journal(12, ann(), ts(2, 10), vec![attr("assigned_to_id", Some("77"), Some("98"))]),
    ];
    source.add_issue(DEMO_PROJECT, handover);
    source.add_issue(DEMO_PROJECT, issue(2, "Unrelated"));
    let mut source = Forbidding::new(source);
    source.users = true;
    let (target, _) = demo_target();

    let mut migrator = Migrator::new(source, target, config());
    let report = migrator.run().unwrap();
    let (source, target) = migrator.into_parts();

    let project = &report.projects[0];
    assert_eq!(project.outcome, ProjectOutcome::Complete);
    assert_eq!(project.issues_created, 2);
    assert_eq!(target.issues().len(), 2);

    let bodies: Vec<&str> = target
        .notes_for(target.issues()[0].id)
        .iter()
        .map(|note| note.body.as_str())
        .collect();
    assert_eq!(
        bodies,
        [
            "reassigned to Redmine user #98",
            "reassigned to Redmine user #77",
            "reassigned to Redmine user #98",
        ]
    );
    assert!(target.notes_for(target.issues()[1].id).is_empty());

    assert_eq!(source.refused, ["user 98", "user 77"]);
    assert_eq!(project.errors.len(), 2);
    for error in &project.errors {
        assert_eq!(error.kind, RecordKind::Lookup);
        assert_eq!(error.code, ErrorCode::Rejected);
        assert_eq!(error.source_issue, Some(1));
    }
}

#[test]
fn forbidden_status_table_skips_status_labels() {
    let mut source = demo_source();
    let mut resolved = issue(1, "Resolved later");
    resolved.journals = vec![
        journal(11, ann(), ts(2, 9), vec![attr("status_id", Some("1"), Some("3"))]),
        note(12, ann(), ts(2, 10), "still here"),
    ];
    source.add_issue(DEMO_PROJECT, resolved);
    let mut source = Forbidding::new(source);
    source.statuses = true;
    let (target, _) = demo_target();

    let mut migrator = Migrator::new(source, target, config());
    let report = migrator.run().unwrap();
    let (source, target) = migrator.into_parts();

    let created = &target.issues()[0];
    assert!(target.events_for(created.id, EventAction::Closed).is_empty());
    assert_eq!(
        created.labels,
        ["Status: New", "Priority: Normal", "Bug"].map(String::from)
    );
    let notes = target.notes_for(created.id);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].body, "still here");

    assert_eq!(source.refused, ["statuses"]);
    let errors = &report.projects[0].errors;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, RecordKind::Lookup);
}

#[test]
fn oversized_page_is_rejected_before_listing() {
    let mut source = demo_source();
    source.add_issue(DEMO_PROJECT, issue(1, "Never listed"));
    let (target, _) = demo_target();
    let mut config = config();
    config.page_size = 200;

    let mut migrator = Migrator::new(source, target, config);
    let err = migrator.run().unwrap_err();
    assert_eq!(err.code(), ErrorCode::Config);
    assert!(err.to_string().contains("page_size"));
    assert!(migrator.source().calls().is_empty());
}

#[test]
fn zero_page_size_is_rejected_before_listing() {
    let (target, _) = demo_target();
    let mut config = config();
    config.page_size = 0;

    let mut migrator = Migrator::new(demo_source(), target, config);
    assert_eq!(migrator.run().unwrap_err().code(), ErrorCode::Config);
    assert_eq!(migrator.check().unwrap_err().code(), ErrorCode::Config);
    assert!(migrator.source().calls().is_empty());
}
