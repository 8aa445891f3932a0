//! Redmine records.
//!
//! Each resource kind gets an explicit record populated from the JSON
//! envelope. Fields we never read are dropped during deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A `{ "id": .., "name": .. }` reference to a Redmine user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Reference to a status, tracker, priority or category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRecord {
    pub id: u64,
    pub name: String,
}

/// Bare `{ "id": .. }` reference (e.g. an issue's parent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProject {
    pub id: u64,
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub parent: Option<NamedRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUser {
    pub id: u64,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub mail: Option<String>,
}

impl SourceUser {
    /// "First Last", falling back to the login.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.firstname, self.lastname);
        let full = full.trim();
        if full.is_empty() {
            self.login.clone()
        } else {
            full.to_string()
        }
    }
}

/// A custom field value; multi-select fields carry a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomFieldValue {
    One(String),
    Many(Vec<String>),
}

impl CustomFieldValue {
    /// Non-empty values, in order.
    #[must_use]
    pub fn values(&self) -> Vec<&str> {
        let values: Vec<&str> = match self {
            Self::One(value) => vec![value.as_str()],
            Self::Many(values) => values.iter().map(String::as_str).collect(),
        };
        values
            .into_iter()
            .filter(|value| !value.trim().is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: Option<CustomFieldValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIssue {
    pub id: u64,
    #[serde(default)]
    pub project: Option<NamedRecord>,
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    pub author: UserRef,
    #[serde(default, rename = "assigned_to")]
    pub assignee: Option<UserRef>,
    pub status: NamedRecord,
    pub priority: NamedRecord,
    pub tracker: NamedRecord,
    #[serde(default)]
    pub category: Option<NamedRecord>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
    #[serde(default)]
    pub parent: Option<IdRef>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    #[serde(default)]
    pub journals: Vec<Journal>,
    #[serde(default)]
    pub children: Vec<ChildRef>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub changesets: Vec<Changeset>,
}

impl SourceIssue {
    /// Value of a custom field by id, if set.
    #[must_use]
    pub fn custom_value(&self, field_id: u64) -> Option<&CustomFieldValue> {
        self.custom_fields
            .iter()
            .find(|field| field.id == field_id)
            .and_then(|field| field.value.as_ref())
    }

    /// Journals in replay order: ascending creation time, then id.
    #[must_use]
    pub fn journals_in_order(&self) -> Vec<&Journal> {
        let mut journals: Vec<&Journal> = self.journals.iter().collect();
        journals.sort_by(|a, b| a.created_on.cmp(&b.created_on).then(a.id.cmp(&b.id)));
        journals
    }
}

/// One history record on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    pub id: u64,
    pub user: UserRef,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub details: Vec<Detail>,
}

impl Journal {
    /// The note text, if it has any non-whitespace content.
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.notes.as_deref().filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailProperty {
    /// A core issue attribute (`status_id`, `priority_id`, ...).
    Attr,
    /// A custom field; `name` holds its numeric id.
    Cf,
    #[serde(other)]
    Other,
}

/// A single old → new field change within a journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detail {
    pub property: DetailProperty,
    pub name: String,
    #[serde(default)]
    pub old_value: Option<String>,
    #[serde(default)]
    pub new_value: Option<String>,
}

impl Detail {
    /// Old value, treating blank strings as absent.
    #[must_use]
    pub fn before(&self) -> Option<&str> {
        self.old_value.as_deref().filter(|v| !v.trim().is_empty())
    }

    /// New value, treating blank strings as absent.
    #[must_use]
    pub fn after(&self) -> Option<&str> {
        self.new_value.as_deref().filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
    pub id: u64,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub tracker: Option<NamedRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: u64,
    pub filename: String,
    #[serde(default)]
    pub filesize: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub content_url: String,
    pub author: UserRef,
    pub created_on: DateTime<Utc>,
}

impl Attachment {
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|kind| kind.starts_with("image/"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: u64,
    pub issue_id: u64,
    pub issue_to_id: u64,
    pub relation_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    pub revision: String,
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub comments: Option<String>,
    pub committed_on: DateTime<Utc>,
}

/// Nested collections fetched through `?include=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Include {
    Journals,
    Children,
    Attachments,
    Relations,
    Changesets,
}

impl Include {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Journals => "journals",
            Self::Children => "children",
            Self::Attachments => "attachments",
            Self::Relations => "relations",
            Self::Changesets => "changesets",
        }
    }

    /// Comma-joined `include` query value.
    #[must_use]
    pub fn join(includes: &[Self]) -> String {
        includes
            .iter()
            .map(|include| include.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUE_JSON: &str = r#"{
        "id": 42,
        "project": {"id": 1, "name": "Demo"},
        "tracker": {"id": 1, "name": "Bug"},
        "status": {"id": 1, "name": "New"},
        "priority": {"id": 4, "name": "Normal"},
        "author": {"id": 5, "name": "Ann Author"},
        "assigned_to": {"id": 6, "name": "Sam Assignee"},
        "subject": "Crash on save",
        "description": "It crashes.",
        "done_ratio": 0,
        "custom_fields": [
            {"id": 3, "name": "Component", "value": "UI"},
            {"id": 4, "name": "Platforms", "multiple": true, "value": ["linux", ""]}
        ],
        "created_on": "2014-03-01T10:00:00Z",
        "updated_on": "2014-03-02T10:00:00Z",
        "journals": [
            {"id": 9, "user": {"id": 5, "name": "Ann Author"}, "notes": "",
             "created_on": "2014-03-02T09:00:00Z",
             "details": [{"property": "attr", "name": "status_id", "old_value": "1", "new_value": "2"}]},
            {"id": 8, "user": {"id": 5, "name": "Ann Author"}, "notes": "first",
             "created_on": "2014-03-01T11:00:00Z", "details": []}
        ]
    }"#;

    #[test]
    fn issue_deserializes_and_drops_unknown_fields() {
        let issue: SourceIssue = serde_json::from_str(ISSUE_JSON).expect("parse issue");
        assert_eq!(issue.id, 42);
        assert_eq!(issue.assignee.as_ref().map(|u| u.id), Some(6));
        assert!(issue.category.is_none());
        assert!(issue.parent.is_none());
        assert_eq!(
            issue.custom_value(3),
            Some(&CustomFieldValue::One("UI".to_string()))
        );
        assert_eq!(issue.custom_value(4).map(CustomFieldValue::values), Some(vec!["linux"]));
    }

    #[test]
    fn journals_sorted_chronologically() {
        let issue: SourceIssue = serde_json::from_str(ISSUE_JSON).expect("parse issue");
        let ids: Vec<u64> = issue.journals_in_order().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![8, 9]);
        assert_eq!(issue.journals_in_order()[1].note(), None);
    }

    #[test]
    fn unknown_detail_property_is_other() {
        let detail: Detail = serde_json::from_str(
            r#"{"property": "attachment", "name": "12", "new_value": "log.txt"}"#,
        )
        .expect("parse detail");
        assert_eq!(detail.property, DetailProperty::Other);
        assert_eq!(detail.before(), None);
        assert_eq!(detail.after(), Some("log.txt"));
    }

    #[test]
    fn display_name_falls_back_to_login() {
        let user = SourceUser {
            id: 1,
            login: "jdoe".to_string(),
            firstname: String::new(),
            lastname: String::new(),
            mail: None,
        };
        assert_eq!(user.display_name(), "jdoe");
    }

    #[test]
    fn include_join() {
        assert_eq!(
            Include::join(&[Include::Journals, Include::Children]),
            "journals,children"
        );
    }
}
