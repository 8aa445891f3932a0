//! Journal replay.
//!
//! Journals are replayed oldest first. For each entry the note (if any) is
//! posted as a comment, then every detail is translated into label changes,
//! lifecycle events or synthesized system notes. Label changes of one entry
//! are summarized in a single note and then applied to the issue.

use super::cache::Lookup;
use super::labels::CATEGORY_COLOR;
use super::users::Resolution;
use super::ProjectContext;
use crate::error::Result;
use crate::format;
use crate::model::{
    Detail, DetailProperty, EventAction, EventTarget, Journal, Label, NewNote, SourceIssue,
};
use crate::source::Source;
use crate::target::Target;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::debug;

pub const STATUS_PREFIX: &str = "Status: ";
pub const PRIORITY_PREFIX: &str = "Priority: ";

/// Fields whose history was replayed. Fields without history get labels from
/// their current value once replay is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldHistory {
    pub status: bool,
    pub priority: bool,
    pub category: bool,
    pub tracker: bool,
    pub parent: bool,
    pub custom_features: BTreeSet<u64>,
}

/// State of one journal entry while its details are processed.
struct Entry<'j> {
    journal: &'j Journal,
    author: Resolution,
    author_name: Option<String>,
    added: Vec<Label>,
    removed: Vec<Label>,
}

impl Entry<'_> {
    fn at(&self) -> DateTime<Utc> {
        self.journal.created_on
    }

    fn attribute(&self, body: String) -> String {
        match &self.author_name {
            Some(name) => format::with_attribution(&[format::originally_by(name)], &body),
            None => body,
        }
    }
}

fn push_unique(labels: &mut Vec<Label>, label: Label) {
    if !labels.iter().any(|existing| existing.id == label.id) {
        labels.push(label);
    }
}

fn parse_id(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|value| value.trim().parse().ok())
}

impl<S: Source, T: Target> ProjectContext<'_, S, T> {
    /// Replay every journal of `issue` against its translated counterpart.
    pub fn replay_journals(&mut self, issue: &SourceIssue) -> Result<FieldHistory> {
        let mut history = FieldHistory::default();
        let mut assignee_seen = false;

        for journal in issue.journals_in_order() {
            let author = self.users.resolve(&journal.user);
            let author_name = if author.defaulted {
                Some(self.display_name(issue.id, &journal.user)?)
            } else {
                None
            };
            let mut entry = Entry {
                journal,
                author,
                author_name,
                added: Vec::new(),
                removed: Vec::new(),
            };

            if let Some(text) = journal.note() {
                let body = entry.attribute(format::render_note(text));
                let target_issue = self.translator.expect_issue(issue.id)?;
                self.post_note(
                    issue.id,
                    &target_issue,
                    NewNote {
                        body,
                        author_id: author.account_id,
                        created_at: entry.at(),
                        system: false,
                    },
                    true,
                )?;
            }

            for detail in &journal.details {
                self.replay_detail(
                    issue,
                    &mut entry,
                    detail,
                    &mut history,
                    &mut assignee_seen,
                )?;
            }
            self.summarize_labels(issue, &entry)?;
        }
        Ok(history)
    }

    fn replay_detail(
        &mut self,
        issue: &SourceIssue,
        entry: &mut Entry<'_>,
        detail: &Detail,
        history: &mut FieldHistory,
        assignee_seen: &mut bool,
    ) -> Result<()> {
        match (&detail.property, detail.name.as_str()) {
            (DetailProperty::Attr, "status_id") => {
                history.status = true;
                self.replay_status(issue, entry, detail)
            }
            (DetailProperty::Attr, "priority_id") => {
                history.priority = true;
                let names = [detail.before(), detail.after()].map(|raw| {
                    parse_id(raw).and_then(|id| {
                        self.config
                            .priority_name(id)
                            .map(|name| format!("{PRIORITY_PREFIX}{name}"))
                    })
                });
                self.label_change(issue, entry, detail, names, None)
            }
            (DetailProperty::Attr, "assigned_to_id") => {
                let first = !*assignee_seen;
                *assignee_seen = true;
                self.replay_assignee(issue, entry, detail, first)
            }
            (DetailProperty::Attr, "category_id") => {
                history.category = true;
                let lookup = Lookup::Categories(self.source_project_id);
                let names = self.lookup_pair(issue, lookup, detail)?;
                self.label_change(issue, entry, detail, names, Some(CATEGORY_COLOR))
            }
            (DetailProperty::Attr, "tracker_id") => {
                history.tracker = true;
                let names = self.lookup_pair(issue, Lookup::Trackers, detail)?;
                self.label_change(issue, entry, detail, names, None)
            }
            (DetailProperty::Attr, "parent_id") => {
                history.parent = true;
                self.replay_parent(issue, entry, detail)
            }
            (DetailProperty::Cf, raw) => match raw.parse::<u64>() {
                Ok(field) if self.config.custom_features.contains(&field) => {
                    history.custom_features.insert(field);
                    let names =
                        [detail.before(), detail.after()].map(|value| value.map(str::to_string));
                    self.label_change(issue, entry, detail, names, None)
                }
                _ => {
                    debug!(
                        source_issue = issue.id,
                        field = raw,
                        "Skipping unrecognized custom field"
                    );
                    Ok(())
                }
            },
            (property, name) => {
                debug!(
                    source_issue = issue.id,
                    ?property,
                    name,
                    "Skipping unrecognized detail"
                );
                Ok(())
            }
        }
    }

    /// Old and new names of a detail whose values are lookup-table ids.
    fn lookup_pair(
        &mut self,
        issue: &SourceIssue,
        lookup: Lookup,
        detail: &Detail,
    ) -> Result<[Option<String>; 2]> {
        let mut names = [None, None];
        for (slot, raw) in names.iter_mut().zip([detail.before(), detail.after()]) {
            if let Some(id) = parse_id(raw) {
                *slot = self.lookup_name(issue.id, lookup, id)?;
            }
        }
        Ok(names)
    }

    /// Queue the old name for removal and the new one for addition.
    fn label_change(
        &mut self,
        issue: &SourceIssue,
        entry: &mut Entry<'_>,
        detail: &Detail,
        [old, new]: [Option<String>; 2],
        color: Option<&str>,
    ) -> Result<()> {
        for (raw, name, added) in [(detail.before(), old, false), (detail.after(), new, true)] {
            let Some(name) = name else {
                if raw.is_some() {
                    debug!(
                        source_issue = issue.id,
                        field = %detail.name,
                        value = ?raw,
                        "No name for value, skipping label"
                    );
                }
                continue;
            };
            if let Some(label) = self.label(issue.id, &name, color)? {
                if added {
                    push_unique(&mut entry.added, label);
                } else {
                    push_unique(&mut entry.removed, label);
                }
            }
        }
        Ok(())
    }

    fn replay_status(
        &mut self,
        issue: &SourceIssue,
        entry: &mut Entry<'_>,
        detail: &Detail,
    ) -> Result<()> {
        let [old, new] = self.lookup_pair(issue, Lookup::Statuses, detail)?;
        let statuses = &self.config.statuses;
        let action = match (old.as_deref(), new.as_deref()) {
            (Some(old), Some(new)) if statuses.is_open(old) && statuses.is_closed(new) => {
                Some(EventAction::Closed)
            }
            (Some(old), Some(new)) if statuses.is_closed(old) && statuses.is_open(new) => {
                Some(EventAction::Reopened)
            }
            _ => None,
        };
        if let Some(action) = action {
            let target_issue = self.translator.expect_issue(issue.id)?;
            self.emit_event(
                issue.id,
                action,
                EventTarget::Issue {
                    issue_id: target_issue.id,
                },
                entry.author.account_id,
                entry.at(),
            )?;
        }
        let names = [old, new].map(|name| name.map(|name| format!("{STATUS_PREFIX}{name}")));
        self.label_change(issue, entry, detail, names, None)
    }

    fn replay_assignee(
        &mut self,
        issue: &SourceIssue,
        entry: &Entry<'_>,
        detail: &Detail,
        first: bool,
    ) -> Result<()> {
        if first {
            if let Some(old) = detail.before() {
                let name = self.account_name(issue.id, old)?;
                self.system_note(
                    issue.id,
                    format::reassigned_to(Some(&name)),
                    entry.author.account_id,
                    issue.created_on,
                )?;
            }
        }
        let new = detail
            .after()
            .map(|raw| self.account_name(issue.id, raw))
            .transpose()?;
        self.system_note(
            issue.id,
            format::reassigned_to(new.as_deref()),
            entry.author.account_id,
            entry.at(),
        )
    }

    fn replay_parent(
        &mut self,
        issue: &SourceIssue,
        entry: &Entry<'_>,
        detail: &Detail,
    ) -> Result<()> {
        let [old, new] = [detail.before(), detail.after()]
            .map(|raw| parse_id(raw).map(|id| self.translator.reference(id)));
        let current = self.translator.expect_issue(issue.id)?;
        let description = format::set_parent_line(&current.description, new.as_deref());
        self.replace_description(issue.id, description)?;
        match format::parent_note(old.as_deref(), new.as_deref()) {
            Some(body) => self.system_note(issue.id, body, entry.author.account_id, entry.at()),
            None => Ok(()),
        }
    }

    /// `@username` for mapped accounts, the Redmine name otherwise.
    fn account_name(&mut self, source_issue: u64, raw: &str) -> Result<String> {
        let Some(id) = parse_id(Some(raw)) else {
            return Ok(raw.to_string());
        };
        if let Some(account) = self.config.users.mapped_account(id) {
            if let Some(user) = self.target_user(source_issue, account)? {
                return Ok(format!("@{}", user.username));
            }
        }
        Ok(self
            .source_user(source_issue, id)?
            .map_or_else(|| format::unknown_user(id), |user| user.display_name()))
    }

    /// Post a synthesized system note on the issue translated from `source_issue`.
    pub fn system_note(
        &mut self,
        source_issue: u64,
        body: String,
        author_id: u64,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let target_issue = self.translator.expect_issue(source_issue)?;
        self.post_note(
            source_issue,
            &target_issue,
            NewNote {
                body,
                author_id,
                created_at,
                system: true,
            },
            false,
        )?;
        Ok(())
    }

    /// One summary note for the entry's label changes, then apply them.
    fn summarize_labels(&mut self, issue: &SourceIssue, entry: &Entry<'_>) -> Result<()> {
        let Some(text) = format::label_delta_text(&entry.added, &entry.removed) else {
            return Ok(());
        };
        let target_issue = self.translator.expect_issue(issue.id)?;
        self.post_note(
            issue.id,
            &target_issue,
            NewNote {
                body: entry.attribute(text),
                author_id: entry.author.account_id,
                created_at: entry.at(),
                system: false,
            },
            false,
        )?;
        self.apply_labels(issue.id, &entry.added, &entry.removed)
    }
}
