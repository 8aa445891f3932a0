//! Redmine REST client.
//!
//! Every request carries the `X-Redmine-API-Key` header. List responses are
//! wrapped in an envelope keyed by the pluralized resource name; single
//! records by the singular name.

use super::{ResourceKind, Source};
use crate::config::MigrationConfig;
use crate::error::{MigrateError, Result};
use crate::http::{agent, join_url, map_error};
use crate::model::{Include, NamedRecord, SourceIssue, SourceProject, SourceUser};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, error, trace};

const API_KEY_HEADER: &str = "X-Redmine-API-Key";
/// Redmine caps `limit` at 100 regardless of what is requested.
const PROJECT_PAGE_SIZE: usize = 100;

pub struct RedmineClient {
    agent: ureq::Agent,
    host: String,
    api_key: String,
}

impl std::fmt::Debug for RedmineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedmineClient")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl RedmineClient {
    #[must_use]
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            agent: agent(),
            host: host.into(),
            api_key: api_key.into(),
        }
    }

    /// Build a client from the `source` section. A missing API key is fatal.
    pub fn from_config(config: &MigrationConfig) -> Result<Self> {
        let api_key = config.source_api_key()?;
        Ok(Self::new(config.source.host.clone(), api_key))
    }

    /// `GET path` with the API key; 404 maps to `None`.
    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Option<Value>> {
        let url = join_url(&self.host, path);
        trace!(url = %url, ?query, "GET");
        let mut request = self.agent.get(&url).set(API_KEY_HEADER, &self.api_key);
        for (key, value) in query {
            request = request.query(key, value);
        }
        match request.call() {
            Ok(response) => Ok(Some(response.into_json::<Value>()?)),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(err) => Err(map_error(&self.host, "redmine request", err)),
        }
    }

    /// List records of `kind` from `path` (defaults to `<plural>.json`).
    ///
    /// A 404 yields an empty list; a body without the plural key is an error.
    pub fn list_resource<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        path: Option<&str>,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let default_path = format!("{}.json", kind.pluralized());
        let path = path.unwrap_or(&default_path);
        let Some(body) = self.get_json(path, query)? else {
            debug!(path, "List returned 404");
            return Ok(Vec::new());
        };
        extract_envelope(body, kind.pluralized(), path)
    }

    /// Fetch one record of `kind`, optionally with nested collections.
    pub fn get_resource<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        id: u64,
        includes: &[Include],
    ) -> Result<Option<T>> {
        let path = format!("{}/{id}.json", kind.pluralized());
        let query = if includes.is_empty() {
            Vec::new()
        } else {
            vec![("include", Include::join(includes))]
        };
        match self.get_json(&path, &query)? {
            Some(body) => extract_envelope(body, kind.resource_name(), &path).map(Some),
            None => Ok(None),
        }
    }
}

fn extract_envelope<T: DeserializeOwned>(mut body: Value, key: &str, path: &str) -> Result<T> {
    let Some(inner) = body.get_mut(key).map(Value::take) else {
        return Err(MigrateError::Envelope {
            path: path.to_string(),
            key: key.to_string(),
        });
    };
    Ok(serde_json::from_value(inner)?)
}

impl Source for RedmineClient {
    fn host(&self) -> &str {
        &self.host
    }

    fn test_connection(&mut self) -> Result<bool> {
        let url = join_url(&self.host, "/");
        match self.agent.get(&url).call() {
            Ok(response) => {
                debug!(host = %self.host, status = response.status(), "Connection established");
                Ok(true)
            }
            Err(ureq::Error::Status(status, _)) => {
                error!(host = %self.host, status, "Connection failed");
                Ok(false)
            }
            Err(err) => Err(map_error(&self.host, "connection test", err)),
        }
    }

    fn list_projects(&mut self) -> Result<Vec<SourceProject>> {
        let mut projects = Vec::new();
        let mut offset = 0;
        loop {
            let page: Vec<SourceProject> = self.list_resource(
                ResourceKind::Project,
                None,
                &[
                    ("offset", offset.to_string()),
                    ("limit", PROJECT_PAGE_SIZE.to_string()),
                ],
            )?;
            let fetched = page.len();
            projects.extend(page);
            if fetched < PROJECT_PAGE_SIZE {
                break;
            }
            offset += PROJECT_PAGE_SIZE;
        }
        Ok(projects)
    }

    fn list_issues(
        &mut self,
        project_id: u64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SourceIssue>> {
        self.list_resource(
            ResourceKind::Issue,
            None,
            &[
                ("project_id", project_id.to_string()),
                ("status_id", "*".to_string()),
                ("subproject_id", "!*".to_string()),
                ("sort", "id:asc".to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ],
        )
    }

    fn get_issue(&mut self, id: u64, includes: &[Include]) -> Result<Option<SourceIssue>> {
        self.get_resource(ResourceKind::Issue, id, includes)
    }

    fn get_user(&mut self, id: u64) -> Result<Option<SourceUser>> {
        self.get_resource(ResourceKind::User, id, &[])
    }

    fn list_statuses(&mut self) -> Result<Vec<NamedRecord>> {
        self.list_resource(ResourceKind::IssueStatus, None, &[])
    }

    fn list_trackers(&mut self) -> Result<Vec<NamedRecord>> {
        self.list_resource(ResourceKind::Tracker, None, &[])
    }

    fn list_categories(&mut self, project_id: u64) -> Result<Vec<NamedRecord>> {
        let path = format!(
            "projects/{project_id}/{}.json",
            ResourceKind::IssueCategory.pluralized()
        );
        self.list_resource(ResourceKind::IssueCategory, Some(&path), &[])
    }

    fn download(&mut self, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .agent
            .get(url)
            .set(API_KEY_HEADER, &self.api_key)
            .call()
            .map_err(|err| map_error(&self.host, "attachment download", err))?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(dest)?);
        let written = std::io::copy(&mut response.into_reader(), &mut writer)?;
        writer.flush()?;
        debug!(url, dest = %dest.display(), bytes = written, "Attachment stored");
        Ok(written)
    }
}
