//! Find-or-create for GitLab labels.

use crate::error::{MigrateError, Result};
use crate::model::{Label, TargetProject};
use crate::target::Target;
use std::collections::HashMap;
use tracing::{debug, info};

/// Color for labels derived from issue categories.
pub const CATEGORY_COLOR: &str = "#F0AD4E";

/// Canonical label title: trimmed, commas replaced with `;` (GitLab splits
/// label lists on commas), whitespace runs collapsed.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title
        .replace(',', ";")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Labels seen during the run, keyed by target project and normalized title.
#[derive(Debug, Clone, Default)]
pub struct LabelRegistry {
    labels: HashMap<(u64, String), Label>,
    created: usize,
}

impl LabelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the project's label with this title, creating it if needed.
    ///
    /// `color` only applies when the label is created; existing labels keep
    /// their color.
    pub fn ensure<T: Target>(
        &mut self,
        target: &mut T,
        project: &TargetProject,
        title: &str,
        color: Option<&str>,
    ) -> Result<Label> {
        let title = normalize_title(title);
        if title.is_empty() {
            return Err(MigrateError::Rejected {
                resource: "label",
                status: 400,
                message: "label title is blank".to_string(),
            });
        }
        let key = (project.id, title);
        if let Some(label) = self.labels.get(&key) {
            return Ok(label.clone());
        }

        let label = if let Some(existing) = target.find_label(project, &key.1)? {
            debug!(label = %existing.title, id = existing.id, "Found label");
            existing
        } else {
            let created = target.create_label(project, &key.1, color)?;
            self.created += 1;
            info!(label = %created.title, id = created.id, project = %project.path_with_namespace, "New label");
            created
        };
        self.labels.insert(key, label.clone());
        Ok(label)
    }

    /// Labels created by this registry.
    #[must_use]
    pub const fn created(&self) -> usize {
        self.created
    }
}
