//! Markdown rendering for migrated descriptions and notes.
//!
//! Everything here is a pure string transform. Redmine stores Textile-ish
//! markup; GitLab expects Markdown, so notes pass through [`render_note`]
//! before they are written.
//!
//! # Example
//!
//! ```
//! use redmine2gitlab::format::markdown::{render_note, set_parent_line};
//!
//! assert_eq!(render_note("<pre>x = 1</pre>"), "```\nx = 1\n```");
//! assert_eq!(set_parent_line("Body", Some("#3")), "Parent issue: #3\n\nBody");
//! ```

use crate::model::{IssueState, Label};
use once_cell::sync::Lazy;
use regex::Regex;

/// Prefix of the description line that links an issue to its parent.
pub const PARENT_PREFIX: &str = "Parent issue: ";
pub const CHILDREN_HEADING: &str = "### Child issues";
pub const RELATIONS_HEADING: &str = "### Related issues";

static PRE_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<pre>(?:\s*<code[^>]*>)?[ \t]*\n?").expect("valid pre open regex")
});
static PRE_CLOSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\n?[ \t]*(?:</code>\s*)?</pre>").expect("valid pre close regex")
});
static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid line break regex"));
static APPLIED_IN_CHANGESET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Applied in changeset commit:(?:[^\s|]+\|)?(\S+)")
        .expect("valid changeset regex")
});

/// Convert a Redmine note or description body to Markdown.
///
/// - `\r\n` line endings become `\n`
/// - `<pre>` and `<pre><code class=..>` blocks become fenced code blocks
/// - `<br>` becomes a line break
/// - `Applied in changeset commit:repo|abc123` loses its `commit:repo|` prefix
#[must_use]
pub fn render_note(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = PRE_OPEN.replace_all(&text, "```\n");
    let text = PRE_CLOSE.replace_all(&text, "\n```");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = APPLIED_IN_CHANGESET.replace_all(&text, "Applied in changeset $1");
    text.trim_end().to_string()
}

#[must_use]
pub fn originally_by(name: &str) -> String {
    format!("*Originally by {name}*")
}

#[must_use]
pub fn originally_created_by(name: &str) -> String {
    format!("*Originally created by {name}*")
}

#[must_use]
pub fn originally_assigned_to(name: &str) -> String {
    format!("*Originally assigned to {name}*")
}

/// Prefix `body` with attribution lines, separated by a blank line.
#[must_use]
pub fn with_attribution(lines: &[String], body: &str) -> String {
    if lines.is_empty() {
        return body.to_string();
    }
    let header = lines.join("\n");
    if body.is_empty() {
        header
    } else {
        format!("{header}\n\n{body}")
    }
}

/// Render an issue description with its attribution header.
#[must_use]
pub fn render_description(
    description: Option<&str>,
    created_by: Option<&str>,
    assigned_to: Option<&str>,
) -> String {
    let mut lines = Vec::new();
    if let Some(name) = created_by {
        lines.push(originally_created_by(name));
    }
    if let Some(name) = assigned_to {
        lines.push(originally_assigned_to(name));
    }
    let body = description.map(render_note).unwrap_or_default();
    with_attribution(&lines, &body)
}

fn references(labels: &[Label]) -> String {
    labels
        .iter()
        .map(Label::reference)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Summary note for one journal entry's label changes.
///
/// Returns `None` when nothing was added or removed.
#[must_use]
pub fn label_delta_text(added: &[Label], removed: &[Label]) -> Option<String> {
    let noun = |labels: &[Label]| if labels.len() == 1 { "label" } else { "labels" };
    match (added.is_empty(), removed.is_empty()) {
        (true, true) => None,
        (false, false) => Some(format!(
            "Added {} and removed {} labels",
            references(added),
            references(removed)
        )),
        (true, false) => Some(format!("Removed {} {}", references(removed), noun(removed))),
        (false, true) => Some(format!("Added {} {}", references(added), noun(added))),
    }
}

#[must_use]
pub fn parent_line(reference: &str) -> String {
    format!("{PARENT_PREFIX}{reference}")
}

/// Reference currently on the description's parent line, if any.
#[must_use]
pub fn parent_reference(description: &str) -> Option<&str> {
    description
        .lines()
        .find_map(|line| line.strip_prefix(PARENT_PREFIX))
        .map(str::trim)
}

/// Replace the parent line (`Some`) or remove it (`None`).
///
/// The line always sits at the top of the description, followed by a blank
/// line when there is more content.
#[must_use]
pub fn set_parent_line(description: &str, reference: Option<&str>) -> String {
    let rest = description
        .lines()
        .filter(|line| !line.starts_with(PARENT_PREFIX))
        .collect::<Vec<_>>()
        .join("\n");
    let rest = rest.trim_start_matches('\n');
    match reference {
        Some(reference) if rest.is_empty() => parent_line(reference),
        Some(reference) => format!("{}\n\n{rest}", parent_line(reference)),
        None => rest.to_string(),
    }
}

/// System-style note text for a parent change.
#[must_use]
pub fn parent_note(old: Option<&str>, new: Option<&str>) -> Option<String> {
    match (old, new) {
        (None, Some(new)) => Some(format!("added parent issue {new}")),
        (Some(old), Some(new)) => Some(format!("changed parent issue from {old} to {new}")),
        (Some(old), None) => Some(format!("removed parent issue {old}")),
        (None, None) => None,
    }
}

/// Reference text for an issue that was not migrated into this project.
#[must_use]
pub fn untranslated_reference(source_id: u64) -> String {
    format!("Redmine issue #{source_id}")
}

/// Name used for a Redmine user whose record could not be read.
#[must_use]
pub fn unknown_user(source_id: u64) -> String {
    format!("Redmine user #{source_id}")
}

#[must_use]
pub fn reassigned_to(name: Option<&str>) -> String {
    name.map_or_else(
        || "assignee removed".to_string(),
        |name| format!("reassigned to {name}"),
    )
}

#[must_use]
pub fn commit_mention(revision: &str) -> String {
    format!("mentioned in commit {revision}")
}

/// Filename as stored under the uploads directory.
///
/// Only the last path component survives, so a name can never leave the
/// storage directory.
#[must_use]
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let base = base.replace("%20", "_").replace(' ', "_");
    if base.is_empty() || base.chars().all(|c| c == '.') {
        "attachment".to_string()
    } else {
        base
    }
}

/// Markdown link to an uploaded file; images are embedded.
#[must_use]
pub fn attachment_link(name: &str, hash: &str, filename: &str, image: bool) -> String {
    let bang = if image { "!" } else { "" };
    format!("{bang}[{name}](/uploads/{hash}/{filename})")
}

/// Display label for a Redmine relation type, seen from either end.
#[must_use]
pub fn relation_label(relation_type: &str, from_target_side: bool) -> String {
    let (forward, inverse) = match relation_type {
        "relates" => ("relates to", "relates to"),
        "duplicates" => ("duplicates", "duplicated by"),
        "duplicated" => ("duplicated by", "duplicates"),
        "blocks" => ("blocks", "blocked by"),
        "blocked" => ("blocked by", "blocks"),
        "precedes" => ("precedes", "follows"),
        "follows" => ("follows", "precedes"),
        "copied_to" => ("copied to", "copied from"),
        "copied_from" => ("copied from", "copied to"),
        other => return other.replace('_', " "),
    };
    let label = if from_target_side { inverse } else { forward };
    label.to_string()
}

/// One row of a child or relation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRow {
    /// Relation label; unused for child tables.
    pub relation: Option<String>,
    pub reference: String,
    pub title: String,
    pub state: Option<IssueState>,
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn state_cell(state: Option<IssueState>) -> &'static str {
    state.map_or("-", IssueState::as_str)
}

#[must_use]
pub fn children_table(rows: &[IssueRow]) -> String {
    let mut out = format!("{CHILDREN_HEADING}\n\n| Issue | Title | State |\n|---|---|---|");
    for row in rows {
        out.push_str(&format!(
            "\n| {} | {} | {} |",
            cell(&row.reference),
            cell(&row.title),
            state_cell(row.state)
        ));
    }
    out
}

#[must_use]
pub fn relations_table(rows: &[IssueRow]) -> String {
    let mut out = format!(
        "{RELATIONS_HEADING}\n\n| Relation | Issue | Title | State |\n|---|---|---|---|"
    );
    for row in rows {
        out.push_str(&format!(
            "\n| {} | {} | {} | {} |",
            cell(row.relation.as_deref().unwrap_or("relates to")),
            cell(&row.reference),
            cell(&row.title),
            state_cell(row.state)
        ));
    }
    out
}

/// Append a section to a description, separated by a blank line.
#[must_use]
pub fn append_section(description: &str, section: &str) -> String {
    let body = description.trim_end();
    if body.is_empty() {
        section.to_string()
    } else {
        format!("{body}\n\n{section}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(id: u64) -> Label {
        Label {
            id,
            title: format!("L{id}"),
            color: None,
        }
    }

    #[test]
    fn pre_blocks_become_fences() {
        let text = "Trace:\r\n<pre><code class=\"ruby\">\r\nraise Boom\r\n</code></pre>\r\nThanks";
        assert_eq!(render_note(text), "Trace:\n```\nraise Boom\n```\nThanks");
        assert_eq!(render_note("<pre>a</pre>"), "```\na\n```");
    }

    #[test]
    fn line_breaks_and_changesets() {
        assert_eq!(render_note("one<br>two<BR />three"), "one\ntwo\nthree");
        assert_eq!(
            render_note("Applied in changeset commit:core|a1b2c3d."),
            "Applied in changeset a1b2c3d."
        );
        assert_eq!(
            render_note("Applied in changeset commit:a1b2c3d"),
            "Applied in changeset a1b2c3d"
        );
    }

    #[test]
    fn description_attribution_header() {
        let rendered = render_description(Some("Steps"), Some("Ann Lee"), Some("Bo"));
        assert_eq!(
            rendered,
            "*Originally created by Ann Lee*\n*Originally assigned to Bo*\n\nSteps"
        );
        assert_eq!(render_description(None, None, None), "");
        assert_eq!(
            render_description(None, Some("Ann"), None),
            "*Originally created by Ann*"
        );
    }

    #[test]
    fn label_delta_tie_break() {
        assert_eq!(label_delta_text(&[], &[]), None);
        assert_eq!(
            label_delta_text(&[label(2)], &[label(1)]).as_deref(),
            Some("Added ~2 and removed ~1 labels")
        );
        assert_eq!(
            label_delta_text(&[], &[label(1)]).as_deref(),
            Some("Removed ~1 label")
        );
        assert_eq!(
            label_delta_text(&[], &[label(1), label(3)]).as_deref(),
            Some("Removed ~1 ~3 labels")
        );
        assert_eq!(
            label_delta_text(&[label(4)], &[]).as_deref(),
            Some("Added ~4 label")
        );
        assert_eq!(
            label_delta_text(&[label(4), label(5)], &[]).as_deref(),
            Some("Added ~4 ~5 labels")
        );
    }

    #[test]
    fn parent_line_round_trip() {
        let original = "*Originally created by Ann*\n\nBody";
        let with_parent = set_parent_line(original, Some("#7"));
        assert_eq!(parent_reference(&with_parent), Some("#7"));

        let replaced = set_parent_line(&with_parent, Some("#9"));
        assert_eq!(replaced, format!("Parent issue: #9\n\n{original}"));

        assert_eq!(set_parent_line(&replaced, None), original);
        assert_eq!(set_parent_line("", Some("#1")), "Parent issue: #1");
    }

    #[test]
    fn parent_notes() {
        assert_eq!(
            parent_note(None, Some("#2")).as_deref(),
            Some("added parent issue #2")
        );
        assert_eq!(
            parent_note(Some("#2"), Some("#3")).as_deref(),
            Some("changed parent issue from #2 to #3")
        );
        assert_eq!(
            parent_note(Some("#3"), None).as_deref(),
            Some("removed parent issue #3")
        );
    }

    #[test]
    fn stored_names_stay_inside_the_uploads_directory() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("a/b c.png"), "b_c.png");
        assert_eq!(sanitize_filename("C:\\temp\\log.txt"), "log.txt");
        assert_eq!(sanitize_filename(".."), "attachment");
        assert_eq!(sanitize_filename("dir/"), "attachment");
        assert_eq!(sanitize_filename(""), "attachment");
        assert_eq!(sanitize_filename("v1.2..tar"), "v1.2..tar");
    }

    #[test]
    fn attachment_links() {
        assert_eq!(sanitize_filename("my file%20v2.png"), "my_file_v2.png");
        assert_eq!(
            attachment_link("shot.png", "abc", "shot.png", true),
            "![shot.png](/uploads/abc/shot.png)"
        );
        assert_eq!(
            attachment_link("log.txt", "abc", "log.txt", false),
            "[log.txt](/uploads/abc/log.txt)"
        );
    }

    #[test]
    fn relation_labels_invert_from_the_target_side() {
        assert_eq!(relation_label("blocks", false), "blocks");
        assert_eq!(relation_label("blocks", true), "blocked by");
        assert_eq!(relation_label("precedes", true), "follows");
        assert_eq!(relation_label("copied_to", true), "copied from");
        assert_eq!(relation_label("relates", true), "relates to");
        assert_eq!(relation_label("custom_kind", false), "custom kind");
    }

    #[test]
    fn children_table_snapshot() {
        let rows = vec![
            IssueRow {
                relation: None,
                reference: "#4".to_string(),
                title: "Split | merge".to_string(),
                state: Some(IssueState::Closed),
            },
            IssueRow {
                relation: None,
                reference: untranslated_reference(88),
                title: "Elsewhere".to_string(),
                state: None,
            },
        ];
        insta::assert_snapshot!(children_table(&rows), @r"
        ### Child issues

        | Issue | Title | State |
        |---|---|---|
        | #4 | Split \| merge | closed |
        | Redmine issue #88 | Elsewhere | - |
        ");
    }

    #[test]
    fn relations_table_snapshot() {
        let rows = vec![IssueRow {
            relation: Some(relation_label("blocks", true)),
            reference: "#2".to_string(),
            title: "Schema".to_string(),
            state: Some(IssueState::Opened),
        }];
        insta::assert_snapshot!(append_section("Body\n", &relations_table(&rows)), @r"
        Body

        ### Related issues

        | Relation | Issue | Title | State |
        |---|---|---|---|
        | blocked by | #2 | Schema | opened |
        ");
    }
}
