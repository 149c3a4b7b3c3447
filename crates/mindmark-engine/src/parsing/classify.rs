use std::sync::OnceLock;

use regex::Regex;

use super::fences::FenceOpening;
use super::text::leading_indent;

/// Local facts about a single line, with no reference to its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    /// A fence opener (a bare marker run counts; closing is decided by state).
    Fence,
    /// A line that is exactly `$$`.
    MathDelimiter,
    /// A line starting with `$$` that carries an expression, e.g. `$$x$$`.
    MathLine,
    Heading {
        level: u8,
    },
    ListItem,
    Table,
    BlockQuote,
    Html,
    Rule,
    Text,
}

impl LineKind {
    /// Kinds that end a freeform paragraph run.
    pub fn is_boundary(self) -> bool {
        !matches!(self, LineKind::Text | LineKind::Blank)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LineClass<'a> {
    pub text: &'a str,
    /// Leading whitespace in bytes.
    pub indent: usize,
    pub kind: LineKind,
}

impl LineClass<'_> {
    pub fn is_blank(&self) -> bool {
        self.kind == LineKind::Blank
    }
}

/// Classifies individual lines for the normalizer.
pub struct MarkdownLineClassifier;

impl MarkdownLineClassifier {
    pub fn classify<'a>(&self, line: &'a str) -> LineClass<'a> {
        LineClass {
            text: line,
            indent: leading_indent(line).len(),
            kind: line_kind(line),
        }
    }
}

fn line_kind(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if FenceOpening::parse(line).is_some() {
        return LineKind::Fence;
    }
    if trimmed == "$$" {
        return LineKind::MathDelimiter;
    }
    if trimmed.starts_with("$$") {
        return LineKind::MathLine;
    }
    if let Some(level) = heading_level(line) {
        return LineKind::Heading { level };
    }
    if is_horizontal_rule(trimmed) {
        return LineKind::Rule;
    }
    if is_list_item(line) {
        return LineKind::ListItem;
    }
    match trimmed.as_bytes()[0] {
        b'|' => LineKind::Table,
        b'>' => LineKind::BlockQuote,
        b'<' => LineKind::Html,
        _ => LineKind::Text,
    }
}

/// ATX heading level for lines like `## Title` (up to three leading spaces).
pub fn heading_level(line: &str) -> Option<u8> {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    let re = HEADING.get_or_init(|| Regex::new(r"^ {0,3}(#{1,6})\s+").expect("Invalid heading regex"));
    re.captures(line).map(|c| c[1].len() as u8)
}

/// Bullet (`-`, `*`, `+`) or ordinal (`1.`) item followed by whitespace.
/// A bare marker is an empty item, so trimming trailing space keeps the kind.
pub fn is_list_item(line: &str) -> bool {
    list_item_indent(line).is_some()
}

/// Indent of a list item line, or `None` for any other line.
pub fn list_item_indent(line: &str) -> Option<&str> {
    static LIST_ITEM: OnceLock<Regex> = OnceLock::new();
    let re = LIST_ITEM
        .get_or_init(|| Regex::new(r"^(\s*)(?:[-*+]|\d+\.)(?:\s+|$)").expect("Invalid list item regex"));
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// `---`, `***` or `___` (three or more of one character, nothing else).
pub fn is_horizontal_rule(trimmed: &str) -> bool {
    let Some(first) = trimmed.chars().next() else {
        return false;
    };
    matches!(first, '-' | '*' | '_') && trimmed.len() >= 3 && trimmed.chars().all(|c| c == first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", LineKind::Blank)]
    #[case("   ", LineKind::Blank)]
    #[case("```mermaid", LineKind::Fence)]
    #[case("  ~~~", LineKind::Fence)]
    #[case("$$", LineKind::MathDelimiter)]
    #[case("  $$  ", LineKind::MathDelimiter)]
    #[case("$$E=mc^2$$", LineKind::MathLine)]
    #[case("## Title", LineKind::Heading { level: 2 })]
    #[case("  # Indented", LineKind::Heading { level: 1 })]
    #[case("---", LineKind::Rule)]
    #[case("***", LineKind::Rule)]
    #[case("- item", LineKind::ListItem)]
    #[case("    12. item", LineKind::ListItem)]
    #[case("-", LineKind::ListItem)]
    #[case("  3.", LineKind::ListItem)]
    #[case("-item", LineKind::Text)]
    #[case("| a | b |", LineKind::Table)]
    #[case("> quote", LineKind::BlockQuote)]
    #[case("<div>", LineKind::Html)]
    #[case("-*-", LineKind::Text)]
    #[case("#hashtag", LineKind::Text)]
    #[case("plain words", LineKind::Text)]
    fn classifies(#[case] line: &str, #[case] expected: LineKind) {
        let class = MarkdownLineClassifier.classify(line);
        assert_eq!(class.kind, expected);
    }

    #[test]
    fn records_indent() {
        let class = MarkdownLineClassifier.classify("    - nested");
        assert_eq!(class.indent, 4);
        assert_eq!(list_item_indent(class.text), Some("    "));
    }

    #[test]
    fn text_and_blank_are_not_boundaries() {
        assert!(!LineKind::Text.is_boundary());
        assert!(!LineKind::Blank.is_boundary());
        assert!(LineKind::Rule.is_boundary());
        assert!(LineKind::Fence.is_boundary());
    }

    #[test]
    fn seven_hashes_is_not_a_heading() {
        assert_eq!(heading_level("####### x"), None);
    }
}
