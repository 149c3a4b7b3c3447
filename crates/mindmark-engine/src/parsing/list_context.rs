//! Lookback queries answering "which list item owns this offset?".
//!
//! The extractors use these to decide where a rendered image belongs: inline
//! on the owning list item, as a nested child, or as a new top-level item.

use super::classify::{is_list_item, list_item_indent};

/// The list item governing an offset, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListContext {
    pub is_list: bool,
    /// Indent of the owning list item's marker.
    pub indent: String,
    /// Indent for content owned by that item (`indent` plus two spaces).
    pub child_indent: String,
}

impl ListContext {
    pub const CHILD_STEP: &'static str = "  ";

    pub fn for_item(indent: &str) -> Self {
        Self {
            is_list: true,
            indent: indent.to_string(),
            child_indent: format!("{indent}{}", Self::CHILD_STEP),
        }
    }
}

/// CommonMark turns four or more spaces of indent into indented code.
const INDENTED_CODE_THRESHOLD: usize = 4;

/// Nearest non-blank line strictly before `offset`.
fn nearest_non_blank_before(text: &str, offset: usize) -> Option<&str> {
    text[..offset].split('\n').rev().find(|line| !line.trim().is_empty())
}

/// Reports whether the nearest non-blank line before `offset` is a list item.
pub fn get_list_context(text: &str, offset: usize) -> ListContext {
    nearest_non_blank_before(text, offset)
        .and_then(list_item_indent)
        .map(ListContext::for_item)
        .unwrap_or_default()
}

/// Keeps deep indents that belong to a list item, clamps the rest below four.
///
/// An indent of four or more outside a list would become an indented code
/// block once a `- ` marker is emitted at it, so it loses one character.
pub fn compute_safe_indent(indent: &str, text: &str, offset: usize) -> String {
    if indent.chars().count() < INDENTED_CODE_THRESHOLD {
        return indent.to_string();
    }
    if nearest_non_blank_before(text, offset).is_some_and(is_list_item) {
        return indent.to_string();
    }
    let keep = indent.chars().count() - 1;
    indent.chars().take(keep).collect()
}

/// Appends `html` to the last line of `out` when that line is a list item.
///
/// Trailing blank text after the item is dropped. Returns `None` when the
/// last non-blank line is anything else (the item has trailing block content).
pub fn append_inline_to_last_list_item(out: &str, html: &str) -> Option<String> {
    let kept = out.trim_end();
    let line_start = kept.rfind('\n').map_or(0, |i| i + 1);
    let last_line = &kept[line_start..];
    if last_line.is_empty() || !is_list_item(last_line) {
        return None;
    }
    Some(format!("{kept} {html}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keeps_indent_under_list_items() {
        let md = "- parent\n    ```mermaid\nA-->B\n```";
        let idx = md.find("```").unwrap();
        assert_eq!(compute_safe_indent("    ", md, idx), "    ");
    }

    #[test]
    fn clamps_indent_outside_lists() {
        let md = "\n    ```mermaid\nA-->B\n```";
        let idx = md.find("```").unwrap();
        assert_eq!(compute_safe_indent("    ", md, idx), "   ");
    }

    #[test]
    fn short_indent_is_returned_as_is() {
        assert_eq!(compute_safe_indent("  ", "para\n  x", 7), "  ");
    }

    #[test]
    fn returns_list_context_for_list_items() {
        let md = "- parent\n  - child\n    ```mermaid\nA-->B\n```";
        let idx = md.find("```").unwrap();
        let ctx = get_list_context(md, idx);
        assert!(ctx.is_list);
        assert_eq!(ctx.indent, "  ");
        assert_eq!(ctx.child_indent, "    ");
    }

    #[test]
    fn skips_blank_lines_when_looking_back() {
        let md = "1. first\n\n\n   ```dot";
        let ctx = get_list_context(md, md.find("```").unwrap());
        assert!(ctx.is_list);
        assert_eq!(ctx.child_indent, "  ");
    }

    #[test]
    fn returns_non_list_context_otherwise() {
        let md = "Paragraph\n```mermaid\nA-->B\n```";
        let ctx = get_list_context(md, md.find("```").unwrap());
        assert_eq!(ctx, ListContext::default());
        assert_eq!(get_list_context("", 0), ListContext::default());
    }

    #[test]
    fn appends_inline_html_to_last_list_item() {
        let updated = append_inline_to_last_list_item("- Item one\n- Item two", "<img>");
        assert_eq!(updated.as_deref(), Some("- Item one\n- Item two <img>"));
    }

    #[test]
    fn drops_trailing_blank_text_when_appending() {
        let updated = append_inline_to_last_list_item("# H\n  - Child\n\n  ", "<img>");
        assert_eq!(updated.as_deref(), Some("# H\n  - Child <img>"));
    }

    #[test]
    fn returns_none_when_last_line_is_not_a_list_item() {
        assert_eq!(append_inline_to_last_list_item("Paragraph\nMore text", "<img>"), None);
        assert_eq!(append_inline_to_last_list_item("", "<img>"), None);
        assert_eq!(
            append_inline_to_last_list_item("- item\n  continuation", "<img>"),
            None
        );
    }
}
