//! TeX math (`$…$`, `$$…$$`) to embedded SVG images.
//!
//! A single forward scan skips fenced code (same opener/closer rules as the
//! fence scanner, checked at line starts) and inline code spans. Inline code
//! state does not survive a blank line.

use std::sync::OnceLock;

use async_trait::async_trait;
use log::{debug, warn};
use regex::Regex;

use super::RenderOptions;
use super::generation::Generation;
use super::markup::{math_image_html, place_block_image};
use super::result::RenderError;
use super::svg::{
    declared_svg_size, parse_svg_size_with_unit, sanitize_svg_for_xml, set_svg_pixel_size, svg_to_data_url,
};
use crate::parsing::fences::{FenceChar, FenceOpening, is_fence_closing};
use crate::parsing::text::preview;

/// Typesets TeX into an SVG document.
#[async_trait]
pub trait MathRenderer: Send + Sync {
    async fn tex_to_svg(&self, expr: &str, display: bool) -> Result<String, RenderError>;
}

/// Whether `$expr$` looks like math rather than prose with dollar amounts.
pub fn should_render_inline_math(expr: &str) -> bool {
    static CURRENCY: OnceLock<Regex> = OnceLock::new();
    static MATH_SYMBOL: OnceLock<Regex> = OnceLock::new();

    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return false;
    }

    let currency = CURRENCY.get_or_init(|| {
        let amount = r"\d[\d,]*(?:\.\d+)?(?:\s*(?:k|m|b|bn|mm|t))?(?:\s*(?:usd|eur|gbp|cad|aud|jpy|inr))?";
        Regex::new(&format!(r"(?i)^{amount}(?:\s*(?:to|–|-)\s*{amount})?$"))
            .expect("Invalid currency regex")
    });
    if currency.is_match(trimmed) {
        return false;
    }

    let symbol = MATH_SYMBOL.get_or_init(|| Regex::new(r"[\\^_{}=]").expect("Invalid math symbol regex"));
    symbol.is_match(trimmed) || trimmed.chars().any(|c| c.is_ascii_alphabetic())
}

/// Replaces renderable math with `<img>` tags carrying SVG data URLs.
///
/// Without a renderer the text passes through. Returns `None` when
/// `generation` went stale.
pub async fn extract_math(
    text: &str,
    generation: &Generation,
    renderer: Option<&dyn MathRenderer>,
    options: &RenderOptions,
) -> Option<String> {
    let Some(renderer) = renderer else {
        return Some(text.to_string());
    };
    if !text.contains('$') {
        return Some(text.to_string());
    }

    let mut scan = MathScan {
        text,
        generation,
        renderer,
        options,
        out: String::with_capacity(text.len()),
        pos: 0,
        fence: None,
        code_ticks: None,
    };
    scan.run().await?;
    Some(scan.out)
}

struct MathScan<'a> {
    text: &'a str,
    generation: &'a Generation,
    renderer: &'a dyn MathRenderer,
    options: &'a RenderOptions,
    out: String,
    pos: usize,
    fence: Option<(FenceChar, usize)>,
    code_ticks: Option<usize>,
}

impl MathScan<'_> {
    async fn run(&mut self) -> Option<()> {
        let text = self.text;
        let bytes = text.as_bytes();
        while self.pos < bytes.len() {
            if !self.generation.is_current() {
                debug!("Math extraction superseded");
                return None;
            }

            if self.at_line_start() && self.consume_fence_line() {
                continue;
            }

            match bytes[self.pos] {
                b'`' => self.consume_tick_run(),
                _ if self.code_ticks.is_some() => self.copy_char(),
                b'$' if bytes.get(self.pos + 1) == Some(&b'$') => self.consume_display().await?,
                b'$' => self.consume_inline().await?,
                _ => self.copy_char(),
            }
        }
        Some(())
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.text.as_bytes()[self.pos - 1] == b'\n'
    }

    fn line_end(&self) -> usize {
        let text = self.text;
        text[self.pos..].find('\n').map_or(text.len(), |i| self.pos + i + 1)
    }

    /// Copies whole fence lines; returns whether the line was consumed.
    fn consume_fence_line(&mut self) -> bool {
        let text = self.text;
        let end = self.line_end();
        let line = text[self.pos..end].trim_end_matches('\n');

        if line.trim().is_empty() {
            self.code_ticks = None;
        }
        if self.code_ticks.is_some() {
            return false;
        }

        match self.fence {
            Some((marker_char, marker_len)) => {
                if is_fence_closing(line, marker_char, marker_len) {
                    self.fence = None;
                }
            }
            None => match FenceOpening::parse(line) {
                Some(opening) => self.fence = Some((opening.marker_char, opening.marker_len)),
                None => return false,
            },
        }
        self.out.push_str(&text[self.pos..end]);
        self.pos = end;
        true
    }

    fn consume_tick_run(&mut self) {
        let text = self.text;
        let run = text[self.pos..].bytes().take_while(|&b| b == b'`').count();
        self.code_ticks = match self.code_ticks {
            None => Some(run),
            Some(open) if run >= open => None,
            still_open => still_open,
        };
        self.copy(run);
    }

    fn copy(&mut self, len: usize) {
        let text = self.text;
        self.out.push_str(&text[self.pos..self.pos + len]);
        self.pos += len;
    }

    fn copy_char(&mut self) {
        let text = self.text;
        let len = text[self.pos..].chars().next().map_or(1, char::len_utf8);
        self.copy(len);
    }

    /// Offset of the closing `needle`, skipping backslash escapes.
    fn find_closing(&self, from: usize, needle: &str, single_line: bool) -> Option<usize> {
        let mut chars = self.text[from..].char_indices().map(|(i, c)| (from + i, c));
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    chars.next();
                }
                '\n' if single_line => return None,
                _ if self.text[i..].starts_with(needle) => return Some(i),
                _ => {}
            }
        }
        None
    }

    async fn consume_display(&mut self) -> Option<()> {
        let text = self.text;
        let start = self.pos;
        let Some(end) = self.find_closing(start + 2, "$$", false) else {
            self.copy(2);
            return Some(());
        };
        let expr = text[start + 2..end].trim();
        let source = &text[start..end + 2];

        let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
        let prefix = &text[line_start..start];

        match self.render(expr, true).await? {
            None => self.out.push_str(source),
            Some(img) if prefix.trim().is_empty() => {
                self.out.truncate(self.out.len() - prefix.len());
                place_block_image(&mut self.out, text, line_start, prefix, &img);
            }
            Some(img) => self.out.push_str(&img),
        }
        self.pos = end + 2;
        Some(())
    }

    async fn consume_inline(&mut self) -> Option<()> {
        let text = self.text;
        let start = self.pos;
        let Some(end) = self.find_closing(start + 1, "$", true) else {
            self.copy(1);
            return Some(());
        };
        let expr = &text[start + 1..end];
        let source = &text[start..=end];

        let rendered = if should_render_inline_math(expr) {
            self.render(expr, false).await?
        } else {
            None
        };
        self.out.push_str(rendered.as_deref().unwrap_or(source));
        self.pos = end + 1;
        Some(())
    }

    /// `Some(None)` when the expression stays as source, `None` when stale.
    async fn render(&self, expr: &str, display: bool) -> Option<Option<String>> {
        let rendered = self.renderer.tex_to_svg(expr, display).await;
        if !self.generation.is_current() {
            debug!("Math extraction superseded during render");
            return None;
        }

        let svg = match rendered {
            Ok(svg) if !svg.trim().is_empty() => svg,
            Ok(_) => return Some(None),
            Err(e) => {
                warn!("Math render failed; skipping {:?}: {e}", preview(expr, 40));
                return Some(None);
            }
        };

        let svg = sanitize_svg_for_xml(&svg);
        let size = parse_svg_size_with_unit(&svg, self.options.base_font_px)
            .or_else(|| declared_svg_size(&svg))
            .unwrap_or(self.options.math_fallback_size);
        let svg = set_svg_pixel_size(&svg, size);
        Some(Some(math_image_html(&svg_to_data_url(&svg), size, display)))
    }
}
