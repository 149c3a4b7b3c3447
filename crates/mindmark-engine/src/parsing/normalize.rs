//! # Structural Normalizer
//!
//! Rewrites loosely-structured markdown into the canonical form the mind-map
//! renderer understands: headings and lists only, tight lists, fences owned by
//! the list item they belong to.
//!
//! ## Phases
//!
//! 1. **Preprocess**: line endings, container-fence unwrap, setext headings
//! 2. **Line pass**: a state machine over `{Normal, InFence, InMathBlock}`
//!    that promotes freeform paragraphs to headings and re-indents
//!    under-indented fences inside lists
//! 3. **Emission**: blank-line suppression happens as lines are emitted, so
//!    loose lists come out tight without a second regex pass
//!
//! The indent thresholds below are literal (two-space child indent, fences at
//! indent <= 3 repaired); they are tuned to the renderer, not derived from
//! CommonMark.

use std::borrow::Cow;

use super::classify::{LineKind, MarkdownLineClassifier, list_item_indent};
use super::fences::{FenceChar, FenceOpening, is_fence_closing, unwrap_container_fence};
use super::list_context::ListContext;
use super::text::{normalize_newlines, strip_indent};

/// Normalizes `text` into canonical markdown ending with exactly one newline.
pub fn normalize(text: &str) -> String {
    let mut s = normalize_newlines(text).into_owned();
    while let Cow::Owned(inner) = unwrap_container_fence(&s) {
        s = inner;
    }
    let s = convert_setext_headings(&s);
    Normalizer::new().run(&s)
}

/// Heading levels seen so far; promotions go one below the last literal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadingState {
    pub last_heading_level: u8,
    pub last_explicit_heading_level: u8,
}

impl HeadingState {
    pub const MAX_LEVEL: u8 = 6;

    pub fn observe_explicit(&mut self, level: u8) {
        self.last_heading_level = level;
        self.last_explicit_heading_level = level;
    }

    pub fn promotion_level(&self) -> u8 {
        (self.last_explicit_heading_level + 1).min(Self::MAX_LEVEL)
    }

    fn promote(&mut self) -> u8 {
        let level = self.promotion_level();
        self.last_heading_level = level;
        level
    }
}

impl Default for HeadingState {
    fn default() -> Self {
        Self {
            last_heading_level: 3,
            last_explicit_heading_level: 3,
        }
    }
}

#[derive(Debug, Default)]
struct ListTracker {
    in_list_context: bool,
    item: ListContext,
    list_content_indent: usize,
    last_list_indent: Option<usize>,
}

impl ListTracker {
    fn enter(&mut self, indent: &str) {
        self.in_list_context = true;
        self.item = ListContext::for_item(indent);
        self.list_content_indent = self.item.child_indent.len();
        self.last_list_indent = Some(indent.len());
    }

    fn exit(&mut self) {
        self.in_list_context = false;
    }

    fn owns(&self, indent: usize) -> bool {
        self.in_list_context && indent >= self.list_content_indent
    }
}

#[derive(Debug, Clone)]
struct Reindent {
    strip: usize,
    prefix: String,
}

impl Reindent {
    fn apply<'a>(&self, line: &'a str) -> Cow<'a, str> {
        if line.trim().is_empty() {
            return Cow::Borrowed("");
        }
        Cow::Owned(format!("{}{}", self.prefix, strip_indent(line, self.strip)))
    }
}

#[derive(Debug)]
enum State {
    Normal,
    InFence {
        marker_char: FenceChar,
        marker_len: usize,
        reindent: Option<Reindent>,
    },
    InMathBlock,
}

/// What the last non-blank emitted line was, for blank suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emitted {
    Nothing,
    ListItem,
    FenceClose,
    Other,
}

#[derive(Debug)]
struct Output {
    lines: Vec<String>,
    pending_blank: bool,
    last: Emitted,
}

impl Output {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            pending_blank: false,
            last: Emitted::Nothing,
        }
    }

    /// Records a blank line; runs collapse and leading blanks vanish.
    fn blank(&mut self) {
        if !self.lines.is_empty() {
            self.pending_blank = true;
        }
    }

    fn push(&mut self, line: impl Into<String>, emitted: Emitted, drop_blank: bool) {
        if self.pending_blank && !drop_blank {
            self.lines.push(String::new());
        }
        self.pending_blank = false;
        self.lines.push(line.into());
        self.last = emitted;
    }

    /// Pushes a line verbatim inside a fence or math block.
    fn push_raw(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn finish(self) -> String {
        let mut s = self.lines.join("\n");
        s.truncate(s.trim_end().len());
        s.push('\n');
        s
    }
}

struct Normalizer {
    classifier: MarkdownLineClassifier,
    state: State,
    headings: HeadingState,
    list: ListTracker,
    out: Output,
}

impl Normalizer {
    fn new() -> Self {
        Self {
            classifier: MarkdownLineClassifier,
            state: State::Normal,
            headings: HeadingState::default(),
            list: ListTracker::default(),
            out: Output::new(),
        }
    }

    fn run(mut self, text: &str) -> String {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut i = 0usize;
        while i < lines.len() {
            i += self.push_line(&lines, i);
        }
        self.out.finish()
    }

    /// Handles `lines[i]` and returns how many lines were consumed.
    fn push_line(&mut self, lines: &[&str], i: usize) -> usize {
        let line = lines[i];
        match &self.state {
            State::InFence { .. } => {
                self.consume_fence_line(line);
                return 1;
            }
            State::InMathBlock => {
                self.out.push_raw(line);
                if line.trim() == "$$" {
                    self.state = State::Normal;
                    self.out.last = Emitted::Other;
                }
                return 1;
            }
            State::Normal => {}
        }

        let class = self.classifier.classify(line);
        match class.kind {
            LineKind::Blank => self.out.blank(),
            LineKind::Fence => self.open_fence(line),
            LineKind::MathDelimiter => {
                self.out.push(line, Emitted::Other, false);
                self.state = State::InMathBlock;
            }
            LineKind::Heading { level } => {
                self.headings.observe_explicit(level);
                self.list.exit();
                self.out.push(line, Emitted::Other, false);
            }
            LineKind::ListItem => {
                let indent = list_item_indent(line).unwrap_or_default();
                let drop_blank = match self.out.last {
                    Emitted::ListItem => true,
                    Emitted::FenceClose => {
                        indent.len() <= self.list.last_list_indent.unwrap_or(0)
                    }
                    _ => false,
                };
                self.list.enter(indent);
                self.out.push(line, Emitted::ListItem, drop_blank);
            }
            LineKind::Table | LineKind::BlockQuote | LineKind::Html | LineKind::MathLine => {
                self.out.push(line, Emitted::Other, false);
            }
            LineKind::Rule => {
                if !self.list.owns(class.indent) {
                    self.list.exit();
                }
                self.out.push(line, Emitted::Other, false);
            }
            LineKind::Text if self.list.owns(class.indent) => {
                self.out.push(line, Emitted::Other, false);
            }
            LineKind::Text => {
                self.list.exit();
                let (paragraph, consumed) = self.join_paragraph(lines, i);
                let level = self.headings.promote();
                let heading = format!("{} {paragraph}", "#".repeat(level as usize));
                self.out.push(heading, Emitted::Other, false);
                return consumed;
            }
        }
        1
    }

    /// Joins a freeform line with the following non-blank, non-boundary lines.
    fn join_paragraph(&self, lines: &[&str], start: usize) -> (String, usize) {
        let mut parts = vec![lines[start].trim()];
        for next in &lines[start + 1..] {
            let class = self.classifier.classify(next);
            if class.is_blank() || class.kind.is_boundary() {
                break;
            }
            parts.push(next.trim());
        }
        let consumed = parts.len();
        (parts.join(" "), consumed)
    }

    fn open_fence(&mut self, line: &str) {
        let Some(opening) = FenceOpening::parse(line) else {
            self.out.push(line, Emitted::Other, false);
            return;
        };

        let reindent = (self.list.in_list_context
            && opening.indent.len() <= 3
            && !line.starts_with(&self.list.item.child_indent))
            .then(|| Reindent {
                strip: opening.indent.chars().count(),
                prefix: self.list.item.child_indent.clone(),
            });

        let emitted = match &reindent {
            Some(r) => r.apply(line).into_owned(),
            None => line.to_string(),
        };
        self.out.push(emitted, Emitted::Other, false);
        self.state = State::InFence {
            marker_char: opening.marker_char,
            marker_len: opening.marker_len,
            reindent,
        };
    }

    fn consume_fence_line(&mut self, line: &str) {
        let State::InFence {
            marker_char,
            marker_len,
            reindent,
        } = &self.state
        else {
            return;
        };

        let closes = is_fence_closing(line, *marker_char, *marker_len);
        let emitted = match reindent {
            Some(r) => r.apply(line).into_owned(),
            None => line.to_string(),
        };
        self.out.push_raw(emitted);

        if closes {
            self.state = State::Normal;
            self.out.last = Emitted::FenceClose;
        }
    }
}

/// Converts setext headings (`Title\n===`, `Title\n---`) to ATX form.
///
/// Only freeform text lines qualify as titles, and fences and math blocks are
/// skipped, so list items followed by a rule and fenced content survive.
fn convert_setext_headings(text: &str) -> String {
    let classifier = MarkdownLineClassifier;
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<Cow<'_, str>> = Vec::with_capacity(lines.len());
    let mut fence: Option<(FenceChar, usize)> = None;
    let mut in_math = false;
    let mut i = 0usize;

    while i < lines.len() {
        let line = lines[i];
        i += 1;

        if let Some((marker_char, marker_len)) = fence {
            if is_fence_closing(line, marker_char, marker_len) {
                fence = None;
            }
            out.push(Cow::Borrowed(line));
            continue;
        }
        if in_math {
            in_math = line.trim() != "$$";
            out.push(Cow::Borrowed(line));
            continue;
        }

        let class = classifier.classify(line);
        match class.kind {
            LineKind::Fence => {
                fence = FenceOpening::parse(line).map(|o| (o.marker_char, o.marker_len));
            }
            LineKind::MathDelimiter => in_math = true,
            LineKind::Text if class.indent < 4 => {
                if let Some(level) = lines.get(i).and_then(|next| setext_level(next)) {
                    out.push(Cow::Owned(format!("{} {}", "#".repeat(level), line.trim())));
                    i += 1;
                    continue;
                }
            }
            _ => {}
        }
        out.push(Cow::Borrowed(line));
    }

    out.join("\n")
}

fn setext_level(line: &str) -> Option<usize> {
    let trimmed = line.trim();
    if line.len() - line.trim_start().len() > 3 || trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().all(|c| c == '=') {
        Some(1)
    } else if trimmed.chars().all(|c| c == '-') {
        Some(2)
    } else {
        None
    }
}
