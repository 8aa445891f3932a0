//! Redmine issue id -> created GitLab issue.

use crate::error::{MigrateError, Result};
use crate::format::untranslated_reference;
use crate::model::TargetIssue;
use std::collections::HashMap;

/// Populated during phase 1; later phases read it and write back
/// description and label edits.
#[derive(Debug, Clone, Default)]
pub struct IdentifierTranslator {
    order: Vec<u64>,
    issues: HashMap<u64, TargetIssue>,
}

impl IdentifierTranslator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, source_id: u64, issue: TargetIssue) {
        if self.issues.insert(source_id, issue).is_none() {
            self.order.push(source_id);
        }
    }

    #[must_use]
    pub fn lookup(&self, source_id: u64) -> Option<&TargetIssue> {
        self.issues.get(&source_id)
    }

    /// Owned copy of a recorded issue; missing entries are an internal error.
    pub fn expect_issue(&self, source_id: u64) -> Result<TargetIssue> {
        self.lookup(source_id).cloned().ok_or_else(|| {
            MigrateError::Internal(format!("issue #{source_id} was never translated"))
        })
    }

    /// Replace the stored copy of an already recorded issue.
    pub fn update(&mut self, source_id: u64, issue: TargetIssue) -> Result<()> {
        match self.issues.get_mut(&source_id) {
            Some(stored) => {
                *stored = issue;
                Ok(())
            }
            None => Err(MigrateError::Internal(format!(
                "cannot update untranslated issue #{source_id}"
            ))),
        }
    }

    /// `#<iid>` for translated issues, a plain-text fallback otherwise.
    #[must_use]
    pub fn reference(&self, source_id: u64) -> String {
        self.lookup(source_id)
            .map_or_else(|| untranslated_reference(source_id), TargetIssue::reference)
    }

    /// Source ids in creation order.
    #[must_use]
    pub fn source_ids(&self) -> &[u64] {
        &self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
