//! Flattens list items that mix text and inline math into a single image.
//!
//! Text and images inside one mind-map node can wrap and misalign; a list
//! line such as `- Area is <img class="math-img"…> units` is rasterized into
//! one SVG with the math vertically centred on the text.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use log::{debug, warn};
use regex::Regex;
use unicode_width::UnicodeWidthStr;

use super::blobs::{BlobStore, PendingBlobs};
use super::diagrams::Extraction;
use super::generation::Generation;
use super::result::{ImageSize, RenderError, RenderResult};
use crate::parsing::fences::{FenceChar, FenceOpening, is_fence_closing};

/// A run of a flattened line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineFragment {
    Text(String),
    Image { src: String, size: ImageSize },
}

/// Draws a sequence of fragments into one image.
#[async_trait]
pub trait LineRasterizer: Send + Sync {
    async fn rasterize(&self, fragments: &[LineFragment]) -> Result<RenderResult, RenderError>;
}

/// Rasterizes to SVG, measuring text by terminal-style column width.
#[derive(Debug, Clone)]
pub struct SvgLineRasterizer {
    pub font_px: f64,
    /// Advance of one column as a fraction of the font size.
    pub column_em: f64,
    pub padding_px: f64,
}

impl Default for SvgLineRasterizer {
    fn default() -> Self {
        Self {
            font_px: 16.0,
            column_em: 0.6,
            padding_px: 2.0,
        }
    }
}

impl SvgLineRasterizer {
    pub fn new(font_px: f64) -> Self {
        Self {
            font_px,
            ..Self::default()
        }
    }

    fn text_width(&self, text: &str) -> f64 {
        UnicodeWidthStr::width(text) as f64 * self.font_px * self.column_em
    }

    fn line_height(&self, fragments: &[LineFragment]) -> f64 {
        fragments
            .iter()
            .filter_map(|f| match f {
                LineFragment::Image { size, .. } => Some(size.height as f64),
                LineFragment::Text(_) => None,
            })
            .fold(self.font_px * 1.4, f64::max)
    }
}

#[async_trait]
impl LineRasterizer for SvgLineRasterizer {
    async fn rasterize(&self, fragments: &[LineFragment]) -> Result<RenderResult, RenderError> {
        if fragments.is_empty() {
            return Err(RenderError::failed("svg-line", "nothing to rasterize"));
        }

        let height = self.line_height(fragments) + 2.0 * self.padding_px;
        let mid = height / 2.0;
        let mut x = self.padding_px;
        let mut body = String::new();

        for fragment in fragments {
            match fragment {
                LineFragment::Text(text) => {
                    body.push_str(&format!(
                        r#"<text x="{x:.1}" y="{mid:.1}" dominant-baseline="central" xml:space="preserve">{}</text>"#,
                        html_escape::encode_text(text)
                    ));
                    x += self.text_width(text);
                }
                LineFragment::Image { src, size } => {
                    let y = mid - size.height as f64 / 2.0;
                    body.push_str(&format!(
                        r#"<image x="{x:.1}" y="{y:.1}" width="{}" height="{}" href="{}"/>"#,
                        size.width,
                        size.height,
                        html_escape::encode_double_quoted_attribute(src)
                    ));
                    x += size.width as f64;
                }
            }
        }

        let width = x + self.padding_px;
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-size="{font}px">{body}</svg>"#,
            w = width.ceil(),
            h = height.ceil(),
            font = self.font_px,
        );
        Ok(RenderResult::svg(svg).with_size(width, height))
    }
}

fn list_prefix(line: &str) -> Option<&str> {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX
        .get_or_init(|| Regex::new(r"^\s*(?:[-*+]|\d+\.)\s+").expect("Invalid list prefix regex"))
        .find(line)
        .map(|m| m.as_str())
}

fn img_tag() -> &'static Regex {
    static IMG: OnceLock<Regex> = OnceLock::new();
    IMG.get_or_init(|| Regex::new(r"<img\b[^>]*>").expect("Invalid img regex"))
}

fn tag_attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {name}=\"");
    let start = tag.find(&needle)? + needle.len();
    let len = tag[start..].find('"')?;
    Some(&tag[start..start + len])
}

/// Splits list item content into fragments when it mixes inline math and
/// text. Returns `None` for anything else.
pub fn split_math_line(content: &str) -> Option<Vec<LineFragment>> {
    let mut fragments = Vec::new();
    let mut last = 0usize;
    let mut has_math = false;

    for m in img_tag().find_iter(content) {
        let tag = m.as_str();
        let class = tag_attribute(tag, "class").unwrap_or_default();
        if !class.split_whitespace().any(|c| c == "math-img") || class.contains("math-block") {
            return None;
        }
        let size = ImageSize::new(
            tag_attribute(tag, "width")?.parse().ok()?,
            tag_attribute(tag, "height")?.parse().ok()?,
        );
        let src = html_escape::decode_html_entities(tag_attribute(tag, "src")?).into_owned();

        push_text(&mut fragments, &content[last..m.start()]);
        fragments.push(LineFragment::Image { src, size });
        has_math = true;
        last = m.end();
    }
    push_text(&mut fragments, &content[last..]);

    let has_text = fragments.iter().any(|f| matches!(f, LineFragment::Text(_)));
    (has_math && has_text).then_some(fragments)
}

fn push_text(fragments: &mut Vec<LineFragment>, text: &str) {
    if !text.trim().is_empty() {
        fragments.push(LineFragment::Text(text.to_string()));
    }
}

/// Replaces mixed text-and-math list items with one rasterized image each.
///
/// Returns `None` when `generation` went stale; this pass's blobs are
/// revoked by then.
pub async fn flatten_math_lines(
    text: &str,
    generation: &Generation,
    rasterizer: &dyn LineRasterizer,
    store: Arc<dyn BlobStore>,
) -> Option<Extraction> {
    let mut blobs = PendingBlobs::new(store);
    let mut out = Vec::new();
    let mut fence: Option<(FenceChar, usize)> = None;

    for line in text.split('\n') {
        if let Some((marker_char, marker_len)) = fence {
            if is_fence_closing(line, marker_char, marker_len) {
                fence = None;
            }
            out.push(line.to_string());
            continue;
        }
        if let Some(opening) = FenceOpening::parse(line) {
            fence = Some((opening.marker_char, opening.marker_len));
            out.push(line.to_string());
            continue;
        }

        let Some(prefix) = list_prefix(line) else {
            out.push(line.to_string());
            continue;
        };
        let Some(fragments) = split_math_line(&line[prefix.len()..]) else {
            out.push(line.to_string());
            continue;
        };

        if !generation.is_current() {
            debug!("Math line flattening superseded");
            return None;
        }
        let rasterized = rasterizer.rasterize(&fragments).await;
        if !generation.is_current() {
            debug!("Math line flattening superseded during rasterization");
            return None;
        }

        match rasterized {
            Ok(result) if result.is_complete() => {
                let size = result.size_or(ImageSize::new(1, 1));
                let handle = blobs.create(&result.mime, result.data);
                out.push(format!(
                    "{prefix}<img class=\"math-line-img\" alt=\"math\" src=\"{handle}\" width=\"{w}\" height=\"{h}\" style=\"width:{w}px;height:{h}px;\">",
                    w = size.width,
                    h = size.height,
                ));
            }
            Ok(_) => out.push(line.to_string()),
            Err(e) => {
                warn!("Math line rasterization failed; keeping line: {e}");
                out.push(line.to_string());
            }
        }
    }

    Some(Extraction {
        text: out.join("\n"),
        blobs,
    })
}
