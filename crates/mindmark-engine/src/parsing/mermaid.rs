//! Label sanitizing for Mermaid flowcharts.
//!
//! Mermaid's flowchart grammar rejects punctuation in unquoted node and edge
//! labels. Labels are rewritten either as markdown strings (`A["`text`"]`)
//! or with punctuation encoded as Mermaid entities (`#40;`).

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

use super::fences::scan_fences;

/// How labels are rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelOptions {
    /// Replaces `<br>` variants and newlines inside a label.
    pub line_break: String,
    /// Keeps `#34;`-style entities that are already in the label.
    pub preserve_existing: bool,
    /// Decodes HTML entities such as `&quot;` before rewriting.
    pub normalize_html_entities: bool,
    /// Encodes `:` as `#colon;` instead of `#58;`.
    pub use_named_colon: bool,
    /// Emits markdown strings instead of entity-encoded text.
    pub use_markdown_strings: bool,
    pub wrap_edge_labels: bool,
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            line_break: "<br/>".to_string(),
            preserve_existing: true,
            normalize_html_entities: true,
            use_named_colon: true,
            use_markdown_strings: true,
            wrap_edge_labels: true,
        }
    }
}

impl LabelOptions {
    /// Defaults for `source`; ER diagrams keep their edge labels as written.
    pub fn for_source(source: &str) -> Self {
        Self {
            wrap_edge_labels: !is_er_diagram(source),
            ..Self::default()
        }
    }
}

pub fn is_er_diagram(source: &str) -> bool {
    static ER: OnceLock<Regex> = OnceLock::new();
    ER.get_or_init(|| Regex::new(r"(?m)^\s*erDiagram\b").expect("Invalid erDiagram regex"))
        .is_match(source)
}

fn is_flowchart(source: &str) -> bool {
    source
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("%%"))
        .and_then(|header| header.split_whitespace().next())
        .is_some_and(|kind| kind == "flowchart" || kind == "graph")
}

enum Piece<'a> {
    Char(char),
    /// An entity already in Mermaid form, e.g. `#34;`.
    Entity(&'a str),
    Break,
}

fn split_label<'a>(raw: &'a str, options: &LabelOptions) -> Vec<Piece<'a>> {
    static BREAK: OnceLock<Regex> = OnceLock::new();
    static HTML_ENTITY: OnceLock<Regex> = OnceLock::new();
    static MERMAID_ENTITY: OnceLock<Regex> = OnceLock::new();
    let line_break = BREAK.get_or_init(|| Regex::new(r"(?i)^<br\s*/?>").expect("Invalid line break regex"));
    let html_entity = HTML_ENTITY.get_or_init(|| {
        Regex::new(r"^&(#\d+|#[xX][0-9A-Fa-f]+|[A-Za-z]+);").expect("Invalid html entity regex")
    });
    let mermaid_entity =
        MERMAID_ENTITY.get_or_init(|| Regex::new(r"^#(?:\d+|[A-Za-z]+);").expect("Invalid mermaid entity regex"));

    let mut pieces = Vec::new();
    let mut rest = raw;
    while let Some(c) = rest.chars().next() {
        let (piece, len) = if let Some(m) = line_break.find(rest) {
            (Piece::Break, m.len())
        } else if c == '\n' {
            (Piece::Break, 1)
        } else if c == '&'
            && options.normalize_html_entities
            && let Some(caps) = html_entity.captures(rest)
            && let Some(decoded) = decode_html_entity(&caps[1])
        {
            (Piece::Char(decoded), caps[0].len())
        } else if c == '#'
            && options.preserve_existing
            && let Some(m) = mermaid_entity.find(rest)
        {
            (Piece::Entity(m.as_str()), m.len())
        } else {
            (Piece::Char(c), c.len_utf8())
        };
        pieces.push(piece);
        rest = &rest[len..];
    }
    pieces
}

fn decode_html_entity(name: &str) -> Option<char> {
    if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(dec) = name.strip_prefix('#') {
        return dec.parse().ok().and_then(char::from_u32);
    }
    match name {
        "quot" => Some('"'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => None,
    }
}

fn decode_mermaid_entity(entity: &str) -> Option<char> {
    let name = entity.strip_prefix('#')?.strip_suffix(';')?;
    if let Ok(code) = name.parse::<u32>() {
        return char::from_u32(code);
    }
    match name {
        "colon" => Some(':'),
        "quot" => Some('"'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "semi" => Some(';'),
        "nbsp" => Some(' '),
        _ => None,
    }
}

fn needs_encoding(c: char) -> bool {
    c.is_ascii_whitespace() || "\"#&():;<>[]{}|%".contains(c)
}

/// Rewrites a single label body (without quotes or markdown-string ticks).
pub fn sanitize_mermaid_label(raw: &str, options: &LabelOptions) -> String {
    let mut out = String::with_capacity(raw.len());
    for piece in split_label(raw, options) {
        match piece {
            Piece::Break => out.push_str(&options.line_break),
            // A backtick would end the markdown string early.
            Piece::Entity(entity) if options.use_markdown_strings => match decode_mermaid_entity(entity) {
                Some(c) if c != '`' => out.push(c),
                _ => out.push_str(entity),
            },
            Piece::Entity(entity) => out.push_str(entity),
            Piece::Char('`') => out.push_str("#96;"),
            Piece::Char(c) if options.use_markdown_strings => out.push(c),
            Piece::Char(':') if options.use_named_colon => out.push_str("#colon;"),
            Piece::Char(c) if needs_encoding(c) => out.push_str(&format!("#{};", c as u32)),
            Piece::Char(c) => out.push(c),
        }
    }
    out
}

/// Strips the quotes and markdown-string ticks a previous pass added.
fn label_body(label: &str) -> &str {
    let label = label
        .strip_prefix('"')
        .and_then(|l| l.strip_suffix('"'))
        .unwrap_or(label);
    label
        .strip_prefix('`')
        .and_then(|l| l.strip_suffix('`'))
        .unwrap_or(label)
}

fn quoted_label(label: &str, options: &LabelOptions) -> String {
    let body = sanitize_mermaid_label(label_body(label.trim()), options);
    if options.use_markdown_strings {
        format!("\"`{body}`\"")
    } else {
        format!("\"{body}\"")
    }
}

fn edge_label(label: &str, options: &LabelOptions) -> String {
    if !options.wrap_edge_labels || label.trim().is_empty() {
        return label.to_string();
    }
    let body = sanitize_mermaid_label(label_body(label.trim()), options);
    if options.use_markdown_strings {
        format!("`{body}`")
    } else {
        body
    }
}

/// Node shapes, longest opener first.
const SHAPES: [(&str, &str); 8] = [
    ("((", "))"),
    ("([", "])"),
    ("[[", "]]"),
    ("[(", ")]"),
    ("{{", "}}"),
    ("[", "]"),
    ("(", ")"),
    ("{", "}"),
];

/// Byte length of a label starting at `body` up to and including `close`.
fn label_extent(body: &str, close: &str) -> Option<(usize, usize)> {
    if let Some(inner) = body.strip_prefix('"') {
        let end = inner.find(&format!("\"{close}"))?;
        return Some((end + 2, end + 2 + close.len()));
    }
    let end = body.find(close)?;
    Some((end, end + close.len()))
}

fn rewrite_node_labels(segment: &str, options: &LabelOptions) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    let mut prev: Option<char> = None;

    while let Some(c) = rest.chars().next() {
        let after_id = prev.is_some_and(|p| p.is_ascii_alphanumeric() || p == '_');
        if after_id && matches!(c, '[' | '(' | '{') {
            let shape = SHAPES.iter().find_map(|&(open, close)| {
                let body = rest.strip_prefix(open)?;
                let (label_len, consumed) = label_extent(body, close)?;
                Some((open, close, &body[..label_len], open.len() + consumed))
            });
            if let Some((open, close, label, consumed)) = shape
                && !label.trim().is_empty()
            {
                out.push_str(open);
                out.push_str(&quoted_label(label, options));
                out.push_str(close);
                rest = &rest[consumed..];
                prev = close.chars().last();
                continue;
            }
        }
        out.push(c);
        prev = Some(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn sanitize_flow_line(line: &str, options: &LabelOptions) -> String {
    static EDGE: OnceLock<Regex> = OnceLock::new();
    let edge = EDGE.get_or_init(|| {
        Regex::new(r"(?P<arrow>[<ox]?(?:-{2,}|={2,}|-\.+-)[>ox]?\s*)\|(?P<label>[^|]*)\|")
            .expect("Invalid edge label regex")
    });

    let trimmed = line.trim_start();
    let directive = ["%%", "style ", "classDef ", "class ", "click ", "linkStyle "];
    if directive.iter().any(|d| trimmed.starts_with(d)) {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len());
    let mut last = 0usize;
    for caps in edge.captures_iter(line) {
        let (Some(whole), Some(arrow), Some(label)) = (caps.get(0), caps.name("arrow"), caps.name("label")) else {
            continue;
        };
        out.push_str(&rewrite_node_labels(&line[last..whole.start()], options));
        out.push_str(arrow.as_str());
        out.push('|');
        out.push_str(&edge_label(label.as_str(), options));
        out.push('|');
        last = whole.end();
    }
    out.push_str(&rewrite_node_labels(&line[last..], options));
    out
}

/// Rewrites node and edge labels in a flowchart source. Other diagram types
/// are returned unchanged.
pub fn sanitize_mermaid_source_labels(source: &str, options: &LabelOptions) -> String {
    if !is_flowchart(source) {
        return source.to_string();
    }
    source
        .split('\n')
        .map(|line| sanitize_flow_line(line, options))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sanitizes the labels inside every `mermaid` fence of a document.
///
/// Fence markers and indentation are kept byte for byte.
pub fn sanitize_mermaid_fences(text: &str) -> Cow<'_, str> {
    let blocks: Vec<_> = scan_fences(text)
        .into_iter()
        .filter(|block| block.lang == "mermaid" && is_flowchart(&block.content))
        .collect();
    if blocks.is_empty() {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0usize;
    for block in blocks {
        out.push_str(&text[last..block.start]);
        let options = LabelOptions::for_source(&block.content);
        let lines: Vec<&str> = block.source(text).split('\n').collect();
        let body_end = if block.closed { lines.len() - 1 } else { lines.len() };

        let rewritten: Vec<Cow<'_, str>> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| match i {
                0 => Cow::Borrowed(*line),
                i if i >= body_end => Cow::Borrowed(*line),
                _ => Cow::Owned(sanitize_flow_line(line, &options)),
            })
            .collect();
        out.push_str(&rewritten.join("\n"));
        last = block.end;
    }
    out.push_str(&text[last..]);
    Cow::Owned(out)
}
