//! Configuration management for `redmine2gitlab`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. CLI overrides
//! 2. Environment variables (`RM2GL_*`)
//! 3. Config file (`rm2gl.yaml` or `--config`)
//! 4. Defaults
//!
//! The merged result is immutable for the rest of the run.

use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILENAME: &str = "rm2gl.yaml";
/// Issues fetched per Redmine page.
pub const DEFAULT_PAGE_SIZE: usize = 100;
/// Largest `limit` Redmine honors; bigger pages come back truncated.
pub const MAX_PAGE_SIZE: usize = 100;
/// GitLab account used when a Redmine user has no mapping.
pub const DEFAULT_ACCOUNT: u64 = 1;

const ENV_PREFIX: &str = "RM2GL_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSettings {
    pub host: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetSettings {
    pub host: String,
    pub token: Option<String>,
}

/// A conversion table entry. Either a numeric GitLab id or a string that may
/// be empty (meaning "unmapped").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountRef {
    Id(u64),
    Text(String),
}

impl AccountRef {
    #[must_use]
    pub fn account_id(&self) -> Option<u64> {
        match self {
            Self::Id(0) => None,
            Self::Id(id) => Some(*id),
            Self::Text(text) => text.trim().parse::<u64>().ok().filter(|id| *id > 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UserSettings {
    pub default_account: u64,
    pub conversion: BTreeMap<u64, Option<AccountRef>>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            default_account: DEFAULT_ACCOUNT,
            conversion: BTreeMap::new(),
        }
    }
}

impl UserSettings {
    /// Mapped GitLab account for a Redmine user; `None` if absent or empty.
    #[must_use]
    pub fn mapped_account(&self, source_user_id: u64) -> Option<u64> {
        self.conversion
            .get(&source_user_id)
            .and_then(Option::as_ref)
            .and_then(AccountRef::account_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatusSettings {
    pub open: BTreeSet<String>,
    pub closed: BTreeSet<String>,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            open: ["New", "In Progress", "Feedback"]
                .into_iter()
                .map(String::from)
                .collect(),
            closed: ["Resolved", "Closed", "Rejected"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl StatusSettings {
    #[must_use]
    pub fn is_open(&self, name: &str) -> bool {
        self.open.contains(name)
    }

    #[must_use]
    pub fn is_closed(&self, name: &str) -> bool {
        self.closed.contains(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttachmentSettings {
    /// Root of the GitLab uploads directory. Attachments are skipped when unset.
    pub storage_path: Option<PathBuf>,
    /// Fixed per-deployment path segment; derived from the project path when unset.
    pub hash_segment: Option<String>,
}

/// Source field copied into the target display number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IidField {
    /// The Redmine issue id.
    Id,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    pub source: SourceSettings,
    pub target: TargetSettings,
    pub users: UserSettings,
    /// Redmine project identifier -> GitLab project path. Empty = all projects.
    pub projects: BTreeMap<String, String>,
    /// Custom field ids whose values become labels.
    pub custom_features: BTreeSet<u64>,
    pub priorities: BTreeMap<u64, String>,
    pub statuses: StatusSettings,
    pub attachments: AttachmentSettings,
    pub iid_field: Option<IidField>,
    pub page_size: usize,
    /// Restricts the run to these Redmine identifiers (CLI only).
    #[serde(skip)]
    pub project_filter: BTreeSet<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source: SourceSettings::default(),
            target: TargetSettings::default(),
            users: UserSettings::default(),
            projects: BTreeMap::new(),
            custom_features: BTreeSet::new(),
            priorities: default_priorities(),
            statuses: StatusSettings::default(),
            attachments: AttachmentSettings::default(),
            iid_field: None,
            page_size: DEFAULT_PAGE_SIZE,
            project_filter: BTreeSet::new(),
        }
    }
}

fn default_priorities() -> BTreeMap<u64, String> {
    [
        (3, "Low"),
        (4, "Normal"),
        (5, "High"),
        (6, "Urgent"),
        (7, "Immediate"),
    ]
    .into_iter()
    .map(|(id, name)| (id, name.to_string()))
    .collect()
}

impl MigrationConfig {
    /// Parse a YAML document on top of the defaults.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load a YAML file. Missing files return defaults.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// GitLab project path to look up for a Redmine project.
    ///
    /// Returns `None` when an explicit mapping table exists but does not
    /// mention this project.
    #[must_use]
    pub fn target_project_for<'a>(&'a self, identifier: &'a str) -> Option<&'a str> {
        if self.projects.is_empty() {
            return Some(identifier);
        }
        self.projects.get(identifier).map(String::as_str)
    }

    /// Whether the CLI filter admits this project.
    #[must_use]
    pub fn includes_project(&self, identifier: &str) -> bool {
        self.project_filter.is_empty() || self.project_filter.contains(identifier)
    }

    /// Priority name for a Redmine priority id.
    #[must_use]
    pub fn priority_name(&self, id: u64) -> Option<&str> {
        self.priorities.get(&id).map(String::as_str)
    }

    pub fn source_api_key(&self) -> Result<&str> {
        self.source
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(MigrateError::MissingCredential("source.api_key"))
    }

    pub fn target_token(&self) -> Result<&str> {
        self.target
            .token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or(MigrateError::MissingCredential("target.token"))
    }

    /// Check settings that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(MigrateError::config(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.source.host.trim().is_empty() {
            return Err(MigrateError::config("source.host is required"));
        }
        if self.target.host.trim().is_empty() {
            return Err(MigrateError::config("target.host is required"));
        }
        let overlap: Vec<&String> = self
            .statuses
            .open
            .intersection(&self.statuses.closed)
            .collect();
        if !overlap.is_empty() {
            return Err(MigrateError::config(format!(
                "statuses listed as both open and closed: {}",
                overlap
                    .iter()
                    .map(|name| name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        Ok(())
    }
}

/// Values taken from `RM2GL_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub source_host: Option<String>,
    pub source_api_key: Option<String>,
    pub target_host: Option<String>,
    pub target_token: Option<String>,
    pub default_account: Option<u64>,
}

impl EnvOverrides {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    /// Build overrides from an explicit variable list.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut overrides = Self::default();
        for (key, value) in vars {
            let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }
            match stripped.to_ascii_lowercase().as_str() {
                "source_host" => overrides.source_host = Some(value),
                "source_api_key" => overrides.source_api_key = Some(value),
                "target_host" => overrides.target_host = Some(value),
                "target_token" => overrides.target_token = Some(value),
                "default_account" => overrides.default_account = value.trim().parse().ok(),
                _ => {}
            }
        }
        overrides
    }

    pub fn apply(&self, config: &mut MigrationConfig) {
        if let Some(host) = &self.source_host {
            config.source.host.clone_from(host);
        }
        if let Some(key) = &self.source_api_key {
            config.source.api_key = Some(key.clone());
        }
        if let Some(host) = &self.target_host {
            config.target.host.clone_from(host);
        }
        if let Some(token) = &self.target_token {
            config.target.token = Some(token.clone());
        }
        if let Some(account) = self.default_account {
            config.users.default_account = account;
        }
    }
}

/// CLI overrides for config loading (optional).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub source_host: Option<String>,
    pub target_host: Option<String>,
    pub projects: Vec<String>,
}

impl CliOverrides {
    pub fn apply(&self, config: &mut MigrationConfig) {
        if let Some(host) = &self.source_host {
            config.source.host.clone_from(host);
        }
        if let Some(host) = &self.target_host {
            config.target.host.clone_from(host);
        }
        config
            .project_filter
            .extend(self.projects.iter().map(|p| p.trim().to_string()));
    }
}

/// Load configuration with the documented precedence order.
///
/// An explicit `--config` path must exist; the default file may be absent.
pub fn load_config(cli: &CliOverrides) -> Result<MigrationConfig> {
    load_config_with_env(cli, &EnvOverrides::from_env())
}

fn load_config_with_env(cli: &CliOverrides, env_layer: &EnvOverrides) -> Result<MigrationConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                return Err(MigrateError::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            MigrationConfig::from_yaml(path)?
        }
        None => MigrationConfig::from_yaml(Path::new(DEFAULT_CONFIG_FILENAME))?,
    };

    env_layer.apply(&mut config);
    cli.apply(&mut config);
    config.validate()?;

    tracing::debug!(
        source = %config.source.host,
        target = %config.target.host,
        mapped_projects = config.projects.len(),
        mapped_users = config.users.conversion.len(),
        "Configuration loaded"
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r"
source:
  host: https://redmine.example.com
  api_key: secret
target:
  host: https://gitlab.example.com
  token: glpat
users:
  default_account: 7
  conversion:
    15: 1
    19: '2'
    20: ''
    21: ~
projects:
  demo: group/demo
custom_features: [3, 9]
statuses:
  open: [New, Assigned]
  closed: [Done]
attachments:
  storage_path: /var/opt/gitlab/uploads
iid_field: id
";

    #[test]
    fn defaults_match_classic_tables() {
        let config = MigrationConfig::default();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.users.default_account, DEFAULT_ACCOUNT);
        assert_eq!(config.priority_name(4), Some("Normal"));
        assert!(config.statuses.is_open("Feedback"));
        assert!(config.statuses.is_closed("Rejected"));
    }

    #[test]
    fn yaml_parses_conversion_entries() {
        let config = MigrationConfig::from_yaml_str(SAMPLE).expect("parse");
        assert_eq!(config.users.default_account, 7);
        assert_eq!(config.users.mapped_account(15), Some(1));
        assert_eq!(config.users.mapped_account(19), Some(2));
        assert_eq!(config.users.mapped_account(20), None);
        assert_eq!(config.users.mapped_account(21), None);
        assert_eq!(config.users.mapped_account(99), None);
        assert!(config.custom_features.contains(&9));
        assert_eq!(config.iid_field, Some(IidField::Id));
        // Unspecified sections keep their defaults.
        assert_eq!(config.priority_name(7), Some("Immediate"));
        assert!(config.statuses.is_open("Assigned"));
        assert!(!config.statuses.is_open("Closed"));
    }

    #[test]
    fn project_mapping_falls_back_to_identifier() {
        let mut config = MigrationConfig::default();
        assert_eq!(config.target_project_for("demo"), Some("demo"));

        config
            .projects
            .insert("demo".to_string(), "group/demo".to_string());
        assert_eq!(config.target_project_for("demo"), Some("group/demo"));
        assert_eq!(config.target_project_for("other"), None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = MigrationConfig::from_yaml_str("sourec:\n  host: x\n").unwrap_err();
        assert!(matches!(err, MigrateError::Yaml(_)));
    }

    #[test]
    fn env_overrides_beat_file_and_cli_beats_env() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("rm2gl.yaml");
        fs::write(&path, SAMPLE).expect("write config");

        let env_layer = EnvOverrides::from_vars(vec![
            ("RM2GL_SOURCE_HOST".to_string(), "https://env.example".to_string()),
            ("RM2GL_TARGET_TOKEN".to_string(), "from-env".to_string()),
            ("RM2GL_DEFAULT_ACCOUNT".to_string(), "12".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ]);
        let cli = CliOverrides {
            config: Some(path),
            source_host: Some("https://cli.example".to_string()),
            target_host: None,
            projects: vec!["demo".to_string()],
        };

        let config = load_config_with_env(&cli, &env_layer).expect("load");
        assert_eq!(config.source.host, "https://cli.example");
        assert_eq!(config.target_token().expect("token"), "from-env");
        assert_eq!(config.users.default_account, 12);
        assert!(config.includes_project("demo"));
        assert!(!config.includes_project("other"));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let cli = CliOverrides {
            config: Some(PathBuf::from("/nonexistent/rm2gl.yaml")),
            ..CliOverrides::default()
        };
        let err = load_config_with_env(&cli, &EnvOverrides::default()).unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[test]
    fn validate_rejects_overlapping_status_sets() {
        let mut config = MigrationConfig::from_yaml_str(SAMPLE).expect("parse");
        config.statuses.closed.insert("New".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("New"));
    }

    #[test]
    fn validate_bounds_page_size() {
        let mut config = MigrationConfig::from_yaml_str(SAMPLE).expect("parse");
        config.page_size = MAX_PAGE_SIZE;
        assert!(config.validate().is_ok());
        for bad in [0, MAX_PAGE_SIZE + 1, 200] {
            config.page_size = bad;
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("page_size"), "{bad}: {err}");
        }
    }

    #[test]
    fn missing_credentials_are_reported() {
        let config = MigrationConfig::default();
        assert!(matches!(
            config.source_api_key(),
            Err(MigrateError::MissingCredential("source.api_key"))
        ));
    }
}
