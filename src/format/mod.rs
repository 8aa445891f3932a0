//! Text rendering for migrated content.
//!
//! [`markdown`] holds the pure transforms applied to descriptions and notes:
//! markup conversion, attribution headers, label summaries, parent lines and
//! the child/relation tables.

pub mod markdown;

pub use markdown::{
    IssueRow, append_section, attachment_link, children_table, commit_mention, label_delta_text,
    originally_by, parent_note, parent_reference, reassigned_to, relation_label, relations_table,
    render_description, render_note, sanitize_filename, set_parent_line, unknown_user, untranslated_reference,
    with_attribution,
};
