//! Phase 2 tail and phase 3: attachments, child tables, commit mentions,
//! labels from current values, and relation tables.

use super::journal::{FieldHistory, PRIORITY_PREFIX, STATUS_PREFIX};
use super::labels::CATEGORY_COLOR;
use super::report::RecordKind;
use super::ProjectContext;
use crate::error::Result;
use crate::format::{self, IssueRow};
use crate::model::{Label, NewNote, SourceIssue};
use crate::source::Source;
use crate::target::Target;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Upload directory segment derived from a project path.
#[must_use]
pub fn hash_segment(project_path: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(project_path.as_bytes()));
    digest[..32].to_string()
}

/// Where an attachment is stored under the uploads root.
#[must_use]
pub fn storage_path(root: &Path, project_path: &str, hash: &str, filename: &str) -> PathBuf {
    root.join(project_path).join(hash).join(filename)
}

impl<S: Source, T: Target> ProjectContext<'_, S, T> {
    /// Copy attachments into the uploads directory and link each in a note.
    pub fn attach_files(&mut self, issue: &SourceIssue) -> Result<()> {
        if issue.attachments.is_empty() {
            return Ok(());
        }
        let Some(root) = self.config.attachments.storage_path.clone() else {
            debug!(
                source_issue = issue.id,
                count = issue.attachments.len(),
                "No attachment storage configured, skipping attachments"
            );
            return Ok(());
        };
        let project_path = self.project.path_with_namespace.clone();
        let hash = self
            .config
            .attachments
            .hash_segment
            .clone()
            .unwrap_or_else(|| hash_segment(&project_path));

        for attachment in &issue.attachments {
            let filename = format::sanitize_filename(&attachment.filename);
            let dest = storage_path(&root, &project_path, &hash, &filename);
            let downloaded = self.source.download(&attachment.content_url, &dest);
            let Some(bytes) = self
                .report
                .absorb(RecordKind::Attachment, Some(issue.id), downloaded)?
            else {
                continue;
            };
            self.report.attachments_stored += 1;
            debug!(file = %dest.display(), bytes, "Stored attachment");

            let author = self.users.resolve(&attachment.author);
            let mut body = format::attachment_link(
                &attachment.filename,
                &hash,
                &filename,
                attachment.is_image(),
            );
            if let Some(description) = attachment
                .description
                .as_deref()
                .filter(|text| !text.trim().is_empty())
            {
                body = format!("{body}\n\n{description}");
            }
            if author.defaulted {
                let name = self.display_name(issue.id, &attachment.author)?;
                body = format::with_attribution(&[format::originally_by(&name)], &body);
            }
            let target_issue = self.translator.expect_issue(issue.id)?;
            self.post_note(
                issue.id,
                &target_issue,
                NewNote {
                    body,
                    author_id: author.account_id,
                    created_at: attachment.created_on,
                    system: false,
                },
                true,
            )?;
        }
        Ok(())
    }

    /// Append the child issue table to the parent's description.
    pub fn link_children(&mut self, issue: &SourceIssue) -> Result<()> {
        if issue.children.is_empty() {
            return Ok(());
        }
        let rows: Vec<IssueRow> = issue
            .children
            .iter()
            .map(|child| match self.translator.lookup(child.id) {
                Some(translated) => IssueRow {
                    relation: None,
                    reference: translated.reference(),
                    title: translated.title.clone(),
                    state: Some(translated.state),
                },
                None => IssueRow {
                    relation: None,
                    reference: format::untranslated_reference(child.id),
                    title: child.subject.clone(),
                    state: None,
                },
            })
            .collect();
        let current = self.translator.expect_issue(issue.id)?;
        let description =
            format::append_section(&current.description, &format::children_table(&rows));
        self.replace_description(issue.id, description)?;
        Ok(())
    }

    /// One `mentioned in commit` system note per changeset.
    pub fn mention_changesets(&mut self, issue: &SourceIssue) -> Result<()> {
        for changeset in &issue.changesets {
            let author_id = match &changeset.user {
                Some(user) => self.users.resolve(user).account_id,
                None => self.users.default_account(),
            };
            self.system_note(
                issue.id,
                format::commit_mention(&changeset.revision),
                author_id,
                changeset.committed_on,
            )?;
        }
        Ok(())
    }

    /// Labels and parent line from current values for fields without history.
    pub fn apply_current_values(
        &mut self,
        issue: &SourceIssue,
        history: &FieldHistory,
    ) -> Result<()> {
        let mut titles: Vec<(String, Option<&str>)> = Vec::new();
        if !history.status {
            titles.push((format!("{STATUS_PREFIX}{}", issue.status.name), None));
        }
        if !history.priority {
            let name = self
                .config
                .priority_name(issue.priority.id)
                .unwrap_or(issue.priority.name.as_str());
            titles.push((format!("{PRIORITY_PREFIX}{name}"), None));
        }
        if !history.category {
            if let Some(category) = &issue.category {
                titles.push((category.name.clone(), Some(CATEGORY_COLOR)));
            }
        }
        if !history.tracker {
            titles.push((issue.tracker.name.clone(), None));
        }
        for field in &self.config.custom_features {
            if history.custom_features.contains(field) {
                continue;
            }
            if let Some(value) = issue.custom_value(*field) {
                titles.extend(value.values().into_iter().map(|v| (v.to_string(), None)));
            }
        }

        let mut labels: Vec<Label> = Vec::new();
        for (title, color) in titles {
            if let Some(label) = self.label(issue.id, &title, color)? {
                if !labels.iter().any(|existing| existing.id == label.id) {
                    labels.push(label);
                }
            }
        }
        if !labels.is_empty() {
            info!(
                source_issue = issue.id,
                labels = ?labels.iter().map(|l| l.title.as_str()).collect::<Vec<_>>(),
                "New labels"
            );
        }
        self.apply_labels(issue.id, &labels, &[])?;

        if !history.parent {
            if let Some(parent) = issue.parent {
                let reference = self.translator.reference(parent.id);
                let current = self.translator.expect_issue(issue.id)?;
                let description = format::set_parent_line(&current.description, Some(&reference));
                self.replace_description(issue.id, description)?;
            }
        }
        Ok(())
    }

    /// Append the related issue table, seen from this issue's side.
    pub fn link_relations(&mut self, issue: &SourceIssue) -> Result<()> {
        if issue.relations.is_empty() {
            return Ok(());
        }
        let rows: Vec<IssueRow> = issue
            .relations
            .iter()
            .map(|relation| {
                let inverse = relation.issue_to_id == issue.id;
                let other = if inverse {
                    relation.issue_id
                } else {
                    relation.issue_to_id
                };
                let translated = self.translator.lookup(other);
                IssueRow {
                    relation: Some(format::relation_label(&relation.relation_type, inverse)),
                    reference: self.translator.reference(other),
                    title: translated.map(|t| t.title.clone()).unwrap_or_default(),
                    state: translated.map(|t| t.state),
                }
            })
            .collect();
        let current = self.translator.expect_issue(issue.id)?;
        let description =
            format::append_section(&current.description, &format::relations_table(&rows));
        if self.replace_description(issue.id, description)? {
            self.report.relations_linked += rows.len();
        }
        Ok(())
    }
}
