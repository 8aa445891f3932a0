#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use redmine2gitlab::config::{AccountRef, MigrationConfig};
use redmine2gitlab::model::{
    Detail, DetailProperty, Journal, NamedRecord, SourceIssue, SourceProject, TargetProject,
    UserRef,
};
use redmine2gitlab::source::MemorySource;
use redmine2gitlab::target::MemoryTarget;
use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        redmine2gitlab::logging::init_test_logging();
    });
}

/// Redmine project id of the `demo` fixture.
pub const DEMO_PROJECT: u64 = 1;
/// Mapped Redmine author and its GitLab account.
pub const ANN: u64 = 5;
pub const ANN_ACCOUNT: u64 = 41;
pub const DEFAULT_ACCOUNT: u64 = 1;

pub fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 3, day, hour, 0, 0).unwrap()
}

pub fn named(id: u64, name: &str) -> NamedRecord {
    NamedRecord {
        id,
        name: name.to_string(),
    }
}

pub fn user(id: u64, name: &str) -> UserRef {
    UserRef {
        id,
        name: name.to_string(),
    }
}

pub fn ann() -> UserRef {
    user(ANN, "Ann Author")
}

/// A `New` / `Normal` / `Bug` issue by Ann with no history.
pub fn issue(id: u64, subject: &str) -> SourceIssue {
    SourceIssue {
        id,
        project: Some(named(DEMO_PROJECT, "Demo")),
        subject: subject.to_string(),
        description: None,
        author: ann(),
        assignee: None,
        status: named(1, "New"),
        priority: named(4, "Normal"),
        tracker: named(1, "Bug"),
        category: None,
        custom_fields: Vec::new(),
        parent: None,
        created_on: ts(1, 10),
        updated_on: ts(1, 10),
        journals: Vec::new(),
        children: Vec::new(),
        attachments: Vec::new(),
        relations: Vec::new(),
        changesets: Vec::new(),
    }
}

pub fn attr(name: &str, old: Option<&str>, new: Option<&str>) -> Detail {
    Detail {
        property: DetailProperty::Attr,
        name: name.to_string(),
        old_value: old.map(str::to_string),
        new_value: new.map(str::to_string),
    }
}

pub fn cf(id: u64, old: Option<&str>, new: Option<&str>) -> Detail {
    Detail {
        property: DetailProperty::Cf,
        ..attr(&id.to_string(), old, new)
    }
}

pub fn journal(id: u64, author: UserRef, at: DateTime<Utc>, details: Vec<Detail>) -> Journal {
    Journal {
        id,
        user: author,
        notes: None,
        created_on: at,
        details,
    }
}

pub fn note(id: u64, author: UserRef, at: DateTime<Utc>, text: &str) -> Journal {
    Journal {
        notes: Some(text.to_string()),
        ..journal(id, author, at, Vec::new())
    }
}

/// Ann is mapped; everybody else falls back to the default account.
pub fn config() -> MigrationConfig {
    let mut config = MigrationConfig::default();
    config.source.host = "memory://redmine".to_string();
    config.target.host = "memory://gitlab".to_string();
    config.users.default_account = DEFAULT_ACCOUNT;
    config
        .users
        .conversion
        .insert(ANN, Some(AccountRef::Id(ANN_ACCOUNT)));
    config
}

/// Source with the `demo` project and the usual lookup tables.
pub fn demo_source() -> MemorySource {
    let mut source = MemorySource::new();
    source.add_project(SourceProject {
        id: DEMO_PROJECT,
        identifier: "demo".to_string(),
        name: "Demo".to_string(),
        parent: None,
    });
    for (id, name) in [(1, "New"), (2, "In Progress"), (3, "Resolved"), (5, "Closed")] {
        source.add_status(id, name);
    }
    source.add_tracker(1, "Bug");
    source.add_tracker(2, "Feature");
    source.add_category(DEMO_PROJECT, 10, "Backend");
    source
}

/// Target with a project named `demo` and Ann's account.
pub fn demo_target() -> (MemoryTarget, TargetProject) {
    let mut target = MemoryTarget::new();
    let project = target.add_project("demo", "group/demo");
    target.add_user(ANN_ACCOUNT, "ann");
    (target, project)
}

/// Id of the project's label with this title.
pub fn label_id(target: &MemoryTarget, project: &TargetProject, title: &str) -> u64 {
    target
        .labels(project.id)
        .iter()
        .find(|label| label.title == title)
        .unwrap_or_else(|| panic!("label {title:?} missing"))
        .id
}
