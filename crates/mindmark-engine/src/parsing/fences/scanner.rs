use std::borrow::Cow;

use serde::Serialize;

use super::{FenceChar, FenceOpening};
use crate::parsing::text::{LineRef, Span, lines_with_spans, strip_indent};

/// A fenced region found by [`scan_fences`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FenceBlock {
    /// Offset of the opening line, including its indent.
    pub start: usize,
    /// Offset just past the closing marker line, excluding its newline.
    /// For an unterminated fence this is the end of the last line.
    pub end: usize,
    pub indent: String,
    pub marker_char: FenceChar,
    pub marker_len: usize,
    /// Lower-cased first info token; empty when absent.
    pub lang: String,
    pub hint: Option<String>,
    /// Inner lines with the fence's own indent removed.
    pub content: String,
    /// Full info string after the marker run.
    pub info: String,
    /// False when the fence ran to end of text without a closer.
    pub closed: bool,
}

impl FenceBlock {
    pub fn span(&self) -> Span {
        Span {
            start: self.start,
            end: self.end,
        }
    }

    /// The exact source text of the block, markers included.
    pub fn source<'t>(&self, text: &'t str) -> &'t str {
        self.span().slice(text)
    }
}

struct OpenFence<'a> {
    start: usize,
    opening: FenceOpening<'a>,
    lines: Vec<&'a str>,
}

impl OpenFence<'_> {
    fn finish(self, end: usize, closed: bool) -> FenceBlock {
        let strip = self.opening.indent.chars().count();
        let content = self
            .lines
            .iter()
            .map(|line| strip_indent(line, strip))
            .collect::<Vec<_>>()
            .join("\n");

        FenceBlock {
            start: self.start,
            end,
            indent: self.opening.indent.to_string(),
            marker_char: self.opening.marker_char,
            marker_len: self.opening.marker_len,
            lang: self.opening.lang,
            hint: self.opening.hint.map(str::to_string),
            content,
            info: self.opening.info.to_string(),
            closed,
        }
    }
}

/// Finds every fenced region in `text`, ordered by start and non-overlapping.
///
/// Fence-like lines inside an open fence are treated as content. An
/// unterminated fence extends to the end of the text.
pub fn scan_fences(text: &str) -> Vec<FenceBlock> {
    let mut out = Vec::new();
    let mut open: Option<OpenFence<'_>> = None;
    let mut last_line: Option<LineRef<'_>> = None;

    for line in lines_with_spans(text) {
        last_line = Some(line);
        match open.take() {
            Some(fence) if fence.opening.closed_by(line.text) => {
                out.push(fence.finish(line.text_end(), true));
            }
            Some(mut fence) => {
                fence.lines.push(line.text);
                open = Some(fence);
            }
            None => {
                open = FenceOpening::parse(line.text).map(|opening| OpenFence {
                    start: line.span.start,
                    opening,
                    lines: Vec::new(),
                });
            }
        }
    }

    if let Some(fence) = open {
        let end = last_line.map_or(text.len(), |l| l.text_end());
        out.push(fence.finish(end, false));
    }

    out
}

/// Unwraps a document that is entirely one `markdown`/`md` fence.
///
/// Chat assistants often wrap a whole answer in a quadruple-backtick
/// `markdown` block; the inner content is what should be rendered. Any other
/// text is returned unchanged.
pub fn unwrap_container_fence(text: &str) -> Cow<'_, str> {
    let trimmed = text.trim();
    let blocks = scan_fences(trimmed);
    if let [block] = blocks.as_slice()
        && block.closed
        && block.start == 0
        && block.end == trimmed.len()
        && matches!(block.lang.as_str(), "markdown" | "md")
    {
        return Cow::Owned(block.content.clone());
    }
    Cow::Borrowed(text)
}
