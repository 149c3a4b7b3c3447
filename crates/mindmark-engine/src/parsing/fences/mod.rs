//! # Fenced Code Regions
//!
//! All fence syntax knowledge lives here: which lines open a fence, which
//! lines close one, and how a document is split into fence blocks.
//!
//! ## Rules
//!
//! - An opener is `(indent)(3+ backticks | 3+ tildes)(lang?)(hint?)`; anything
//!   after the hint token is ignored
//! - A backtick opener whose info string contains a backtick is not a fence
//! - A closer uses the same marker character with a run at least as long as
//!   the opener and nothing else significant on the line
//! - Fences do not nest: fence-like lines inside an open fence are content

pub mod scanner;

pub use scanner::{FenceBlock, scan_fences, unwrap_container_fence};

use serde::Serialize;

use crate::parsing::text::leading_indent;

/// The marker character of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FenceChar {
    Backtick,
    Tilde,
}

impl FenceChar {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '`' => Some(Self::Backtick),
            '~' => Some(Self::Tilde),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Backtick => '`',
            Self::Tilde => '~',
        }
    }
}

/// A parsed fence opener line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceOpening<'a> {
    /// Leading whitespace before the marker run.
    pub indent: &'a str,
    pub marker_char: FenceChar,
    /// Length of the marker run (always >= 3).
    pub marker_len: usize,
    /// Everything after the marker run, trimmed.
    pub info: &'a str,
    /// First info token, lower-cased. Empty when absent.
    pub lang: String,
    /// Second info token, if any.
    pub hint: Option<&'a str>,
}

impl<'a> FenceOpening<'a> {
    pub const MIN_MARKER_LEN: usize = 3;

    /// Parses a fence opener, returning `None` for any other line.
    pub fn parse(line: &'a str) -> Option<Self> {
        let indent = leading_indent(line);
        let rest = &line[indent.len()..];
        let marker_char = FenceChar::from_char(rest.chars().next()?)?;
        let marker_len = marker_run(rest, marker_char);
        if marker_len < Self::MIN_MARKER_LEN {
            return None;
        }

        let info = rest[marker_len..].trim();
        if marker_char == FenceChar::Backtick && info.contains('`') {
            return None;
        }

        let mut tokens = info.split_whitespace();
        let lang = tokens.next().unwrap_or_default().to_ascii_lowercase();
        let hint = tokens.next();

        Some(Self {
            indent,
            marker_char,
            marker_len,
            info,
            lang,
            hint,
        })
    }

    /// Whether `line` closes the fence this opener started.
    pub fn closed_by(&self, line: &str) -> bool {
        is_fence_closing(line, self.marker_char, self.marker_len)
    }
}

/// Whether `line` is a closer for a fence of `marker_char` with run `min_len`.
pub fn is_fence_closing(line: &str, marker_char: FenceChar, min_len: usize) -> bool {
    let rest = line.trim_start_matches([' ', '\t']);
    let run = marker_run(rest, marker_char);
    run >= min_len && rest[run..].trim().is_empty()
}

fn marker_run(s: &str, marker_char: FenceChar) -> usize {
    s.chars().take_while(|&c| c == marker_char.as_char()).count()
}
