//! Structured record → one linear text blob.
//!
//! This is the only flattening routine in the workspace: the lexical and the
//! semantic index both consume its output, so they always score and embed the
//! same text for a chunk.

use crate::types::{ChunkRecord, ListItem};

pub const SECTION_PREFIX: &str = "Section:";
pub const SUBSECTION_PREFIX: &str = "Subsection:";

/// Spaces of indentation per nesting level for list items below the top level.
pub const INDENT_PER_DEPTH: usize = 8;

/// Flatten a record depth-first in document order.
///
/// Headings come first as `Section: <s>.` / `Subsection: <s>.` lines. Each
/// content block contributes its text followed by its list. Top-level list
/// items are emitted as-is; deeper items lose any leading bullet glyph and are
/// emitted as `<8·depth spaces>- <text>`. Blank fields contribute nothing.
pub fn flatten_record(record: &ChunkRecord) -> String {
    let mut lines: Vec<String> = Vec::new();

    if let Some(section) = non_blank(record.section.as_deref()) {
        lines.push(format!("{SECTION_PREFIX} {section}."));
    }
    if let Some(subsection) = non_blank(record.subsection.as_deref()) {
        lines.push(format!("{SUBSECTION_PREFIX} {subsection}."));
    }

    for block in &record.content {
        let text = block.text.trim();
        if !text.is_empty() {
            lines.push(text.to_string());
        }
        push_items(&block.list, 0, &mut lines);
    }

    lines.join("\n")
}

fn push_items(items: &[ListItem], depth: usize, lines: &mut Vec<String>) {
    for item in items {
        let raw = item.text.trim();
        if depth == 0 {
            if !raw.is_empty() {
                lines.push(raw.to_string());
            }
        } else {
            let content = raw.trim_start_matches(|c: char| c == '•' || c == ' ').trim();
            if !content.is_empty() {
                let indent = " ".repeat(depth * INDENT_PER_DEPTH);
                lines.push(format!("{indent}- {content}"));
            }
        }
        if !item.list.is_empty() {
            push_items(&item.list, depth + 1, lines);
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Drop leading `Section:` lines and surrounding whitespace from a flattened
/// chunk, leaving the content a caller wants to read.
pub fn strip_leading_sections(text: &str) -> &str {
    let mut rest = text;
    loop {
        let (line, tail) = match rest.split_once('\n') {
            Some((line, tail)) => (line, tail),
            None => (rest, ""),
        };
        if !line.starts_with(SECTION_PREFIX) {
            break;
        }
        rest = tail;
        if rest.is_empty() {
            break;
        }
    }
    rest.trim()
}
