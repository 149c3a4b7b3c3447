use super::span::Span;

/// A reference to a single line of the source text with its byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRef<'a> {
    /// Byte span of this line (includes the newline if present).
    pub span: Span,
    /// The line text without its trailing newline.
    pub text: &'a str,
}

impl LineRef<'_> {
    /// Byte offset just past the visible text, before the newline.
    pub fn text_end(&self) -> usize {
        self.span.start + self.text.len()
    }

    /// Whether the line carried a trailing newline.
    pub fn has_newline(&self) -> bool {
        self.span.len() > self.text.len()
    }
}

/// Returns an iterator over lines with their byte spans.
///
/// Splits inclusively so spans tile the input exactly; an input ending in a
/// newline yields no trailing empty line.
pub fn lines_with_spans(text: &str) -> impl Iterator<Item = LineRef<'_>> + '_ {
    let mut offset = 0usize;
    text.split_inclusive('\n').map(move |raw| {
        let start = offset;
        offset += raw.len();
        LineRef {
            span: Span { start, end: offset },
            text: raw.strip_suffix('\n').unwrap_or(raw),
        }
    })
}
