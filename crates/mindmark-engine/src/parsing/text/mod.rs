pub mod lines;
pub mod span;

pub use lines::{LineRef, lines_with_spans};
pub use span::Span;

use std::borrow::Cow;

/// Converts `\r\n` and lone `\r` line endings to `\n`.
pub fn normalize_newlines(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Returns the leading spaces/tabs of a line.
pub fn leading_indent(line: &str) -> &str {
    let rest = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - rest.len()]
}

/// Removes up to `n` leading whitespace characters.
pub fn strip_indent(line: &str, n: usize) -> &str {
    let mut idx = 0usize;
    for (count, (i, c)) in line.char_indices().enumerate() {
        if count >= n || !matches!(c, ' ' | '\t') {
            return &line[i..];
        }
        idx = i + c.len_utf8();
    }
    &line[idx..]
}

/// Returns `s` truncated to at most `max` bytes with a "..." suffix when cut.
///
/// Used for log lines that name a failing block.
pub fn preview(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
