//! Data types for both sides of a migration.
//!
//! - [`source`] - Redmine records as returned by its REST API
//! - [`target`] - GitLab records and the write requests sent to it

pub mod source;
pub mod target;

pub use source::{
    Attachment, Changeset, ChildRef, CustomField, CustomFieldValue, Detail, DetailProperty, IdRef, Include,
    Journal, NamedRecord, Relation, SourceIssue, SourceProject, SourceUser, UserRef,
};
pub use target::{
    Event, EventAction, EventTarget, IssueState, Label, NewEvent, NewIssue, NewNote, Note,
    TargetIssue, TargetProject, TargetUser,
};
