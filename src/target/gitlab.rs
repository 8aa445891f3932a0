//! GitLab REST v4 client.
//!
//! Authored writes (issues, notes) are sent with a `Sudo` header so they are
//! attributed to the mapped account; this needs an admin token. GitLab derives
//! lifecycle events from the writes themselves, so `create_event` only records
//! the event locally.

use super::{DEFAULT_LABEL_COLOR, Target};
use crate::config::MigrationConfig;
use crate::error::Result;
use crate::http::{agent, join_url, map_error};
use crate::model::{
    Event, IssueState, Label, NewEvent, NewIssue, NewNote, Note, TargetIssue, TargetProject,
    TargetUser,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, trace};

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const SUDO_HEADER: &str = "Sudo";
const SEARCH_PAGE_SIZE: &str = "100";

pub struct GitlabClient {
    agent: ureq::Agent,
    host: String,
    api: String,
    token: String,
}

impl std::fmt::Debug for GitlabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitlabClient")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct GitlabLabel {
    id: u64,
    name: String,
    #[serde(default)]
    color: Option<String>,
}

impl From<GitlabLabel> for Label {
    fn from(label: GitlabLabel) -> Self {
        Self {
            id: label.id,
            title: label.name,
            color: label.color,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitlabIssue {
    id: u64,
    iid: u64,
    project_id: u64,
    title: String,
    state: IssueState,
    #[serde(default)]
    description: Option<String>,
    author: IdOnly,
    #[serde(default)]
    assignee: Option<IdOnly>,
    #[serde(default)]
    labels: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GitlabIssue> for TargetIssue {
    fn from(issue: GitlabIssue) -> Self {
        Self {
            id: issue.id,
            iid: issue.iid,
            project_id: issue.project_id,
            title: issue.title,
            state: issue.state,
            author_id: issue.author.id,
            assignee_id: issue.assignee.map(|assignee| assignee.id),
            description: issue.description.unwrap_or_default(),
            labels: issue.labels,
            created_at: issue.created_at,
            updated_at: issue.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitlabNote {
    id: u64,
    body: String,
    author: IdOnly,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    system: bool,
}

impl GitlabClient {
    #[must_use]
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        let host = host.into();
        let api = join_url(&host, "api/v4");
        Self {
            agent: agent(),
            host,
            api,
            token: token.into(),
        }
    }

    /// Build a client from the `target` section. A missing token is fatal.
    pub fn from_config(config: &MigrationConfig) -> Result<Self> {
        let token = config.target_token()?;
        Ok(Self::new(config.target.host.clone(), token))
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let url = join_url(&self.api, path);
        trace!(method, url = %url, "GitLab request");
        self.agent
            .request(method, &url)
            .set(TOKEN_HEADER, &self.token)
    }

    fn get<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let mut request = self.request("GET", path);
        for (key, value) in query {
            request = request.query(key, value);
        }
        match request.call() {
            Ok(response) => Ok(Some(response.into_json::<T>()?)),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(err) => Err(map_error(&self.host, resource, err)),
        }
    }

    fn send<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        request: ureq::Request,
        body: &Value,
    ) -> Result<T> {
        let response = request
            .send_json(body)
            .map_err(|err| map_error(&self.host, resource, err))?;
        Ok(response.into_json::<T>()?)
    }

    fn issue_path(project: &TargetProject, issue: &TargetIssue) -> String {
        format!("projects/{}/issues/{}", project.id, issue.iid)
    }
}

/// Percent-encode a namespaced path for use as a project id.
fn encode_project_path(path: &str) -> String {
    path.replace('/', "%2F")
}

fn label_names(labels: &[Label]) -> String {
    labels
        .iter()
        .map(|label| label.title.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn issue_create_body(issue: &NewIssue) -> Value {
    let mut body = json!({
        "title": issue.title,
        "description": issue.description,
        "created_at": issue.created_at.to_rfc3339(),
    });
    if let Some(assignee) = issue.assignee_id {
        body["assignee_ids"] = json!([assignee]);
    }
    if let Some(iid) = issue.iid {
        body["iid"] = json!(iid);
    }
    body
}

impl Target for GitlabClient {
    fn host(&self) -> &str {
        &self.host
    }

    fn find_project(&mut self, name_or_path: &str) -> Result<Option<TargetProject>> {
        if name_or_path.contains('/') {
            let path = format!("projects/{}", encode_project_path(name_or_path));
            return self.get("project", &path, &[]);
        }
        let candidates: Vec<TargetProject> = self
            .get(
                "project",
                "projects",
                &[
                    ("search", name_or_path),
                    ("simple", "true"),
                    ("per_page", SEARCH_PAGE_SIZE),
                ],
            )?
            .unwrap_or_default();
        Ok(candidates
            .into_iter()
            .find(|project| project.name == name_or_path))
    }

    fn find_user(&mut self, id: u64) -> Result<Option<TargetUser>> {
        self.get("user", &format!("users/{id}"), &[])
    }

    fn find_label(&mut self, project: &TargetProject, title: &str) -> Result<Option<Label>> {
        let labels: Vec<GitlabLabel> = self
            .get(
                "label",
                &format!("projects/{}/labels", project.id),
                &[("search", title), ("per_page", SEARCH_PAGE_SIZE)],
            )?
            .unwrap_or_default();
        Ok(labels
            .into_iter()
            .find(|label| label.name == title)
            .map(Label::from))
    }

    fn create_label(
        &mut self,
        project: &TargetProject,
        title: &str,
        color: Option<&str>,
    ) -> Result<Label> {
        let request = self.request("POST", &format!("projects/{}/labels", project.id));
        let body = json!({
            "name": title,
            "color": color.unwrap_or(DEFAULT_LABEL_COLOR),
        });
        let label: GitlabLabel = self.send("label", request, &body)?;
        Ok(label.into())
    }

    fn create_issue(&mut self, project: &TargetProject, issue: &NewIssue) -> Result<TargetIssue> {
        let request = self
            .request("POST", &format!("projects/{}/issues", project.id))
            .set(SUDO_HEADER, &issue.author_id.to_string());
        let created: GitlabIssue = self.send("issue", request, &issue_create_body(issue))?;
        Ok(created.into())
    }

    fn set_state(
        &mut self,
        project: &TargetProject,
        issue: &TargetIssue,
        state: IssueState,
    ) -> Result<()> {
        let state_event = match state {
            IssueState::Opened => "reopen",
            IssueState::Closed => "close",
        };
        let request = self.request("PUT", &Self::issue_path(project, issue));
        let _: GitlabIssue =
            self.send("issue state", request, &json!({ "state_event": state_event }))?;
        Ok(())
    }

    fn update_description(
        &mut self,
        project: &TargetProject,
        issue: &TargetIssue,
        description: &str,
    ) -> Result<()> {
        let request = self.request("PUT", &Self::issue_path(project, issue));
        let _: GitlabIssue = self.send(
            "issue description",
            request,
            &json!({ "description": description }),
        )?;
        Ok(())
    }

    fn update_labels(
        &mut self,
        project: &TargetProject,
        issue: &TargetIssue,
        add: &[Label],
        remove: &[Label],
    ) -> Result<Vec<String>> {
        let mut body = json!({});
        if !add.is_empty() {
            body["add_labels"] = json!(label_names(add));
        }
        if !remove.is_empty() {
            body["remove_labels"] = json!(label_names(remove));
        }
        let request = self.request("PUT", &Self::issue_path(project, issue));
        let updated: GitlabIssue = self.send("issue labels", request, &body)?;
        Ok(updated.labels)
    }

    fn create_note(
        &mut self,
        project: &TargetProject,
        issue: &TargetIssue,
        note: &NewNote,
    ) -> Result<Note> {
        let request = self
            .request("POST", &format!("{}/notes", Self::issue_path(project, issue)))
            .set(SUDO_HEADER, &note.author_id.to_string());
        let body = json!({
            "body": note.body,
            "created_at": note.created_at.to_rfc3339(),
        });
        let created: GitlabNote = self.send("note", request, &body)?;
        Ok(Note {
            id: created.id,
            issue_id: issue.id,
            body: created.body,
            author_id: created.author.id,
            created_at: created.created_at,
            updated_at: created.updated_at,
            system: created.system || note.system,
            event_id: None,
        })
    }

    fn create_event(&mut self, _project: &TargetProject, event: &NewEvent) -> Result<Event> {
        debug!(
            action = event.action.as_str(),
            issue_id = event.target.issue_id(),
            "Lifecycle event recorded by GitLab"
        );
        Ok(Event {
            id: None,
            action: event.action,
            target: event.target,
            author_id: event.author_id,
            created_at: event.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn project_path_is_encoded() {
        assert_eq!(encode_project_path("group/sub/demo"), "group%2Fsub%2Fdemo");
    }

    #[test]
    fn issue_body_includes_optional_fields() {
        let at = Utc.with_ymd_and_hms(2014, 3, 1, 10, 0, 0).single().expect("time");
        let mut issue = NewIssue {
            title: "Crash".to_string(),
            description: "Body".to_string(),
            author_id: 3,
            assignee_id: None,
            created_at: at,
            updated_at: at,
            iid: None,
        };
        let body = issue_create_body(&issue);
        assert!(body.get("assignee_ids").is_none());
        assert!(body.get("iid").is_none());

        issue.assignee_id = Some(8);
        issue.iid = Some(42);
        let body = issue_create_body(&issue);
        assert_eq!(body["assignee_ids"], json!([8]));
        assert_eq!(body["iid"], json!(42));
        assert_eq!(body["created_at"], json!("2014-03-01T10:00:00+00:00"));
    }

    #[test]
    fn gitlab_issue_maps_to_target_issue() {
        let raw = json!({
            "id": 900, "iid": 12, "project_id": 4, "title": "Crash",
            "state": "closed", "description": null,
            "author": {"id": 3, "username": "ann"},
            "assignee": null, "labels": ["Bug"],
            "created_at": "2014-03-01T10:00:00Z", "updated_at": "2014-03-02T10:00:00Z"
        });
        let issue: TargetIssue = serde_json::from_value::<GitlabIssue>(raw)
            .expect("parse")
            .into();
        assert_eq!(issue.iid, 12);
        assert_eq!(issue.state, IssueState::Closed);
        assert_eq!(issue.description, "");
        assert_eq!(issue.assignee_id, None);
    }

    #[test]
    fn label_names_join_with_commas() {
        let labels = vec![
            Label {
                id: 1,
                title: "Bug".to_string(),
                color: None,
            },
            Label {
                id: 2,
                title: "Status: New".to_string(),
                color: None,
            },
        ];
        assert_eq!(label_names(&labels), "Bug,Status: New");
    }
}
