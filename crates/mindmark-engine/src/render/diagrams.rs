use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;

use super::RenderOptions;
use super::blobs::{BlobStore, PendingBlobs};
use super::generation::Generation;
use super::markup::{diagram_image_html, place_block_image};
use super::result::{RenderContext, RenderError, RenderResult};
use super::svg::{SVG_MIME, inject_svg_style, sanitize_svg_for_xml};
use crate::parsing::fences::scan_fences;
use crate::parsing::mermaid::is_er_diagram;
use crate::parsing::text::{normalize_newlines, preview};

/// Diagram languages with a renderer seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagramKind {
    Mermaid,
    Dot,
    Wavedrom,
    VegaLite,
}

impl DiagramKind {
    pub const ALL: [DiagramKind; 4] = [Self::Mermaid, Self::Dot, Self::Wavedrom, Self::VegaLite];

    /// Resolves a fence language (case-insensitive), including aliases.
    pub fn from_lang(lang: &str) -> Option<Self> {
        match lang.to_ascii_lowercase().as_str() {
            "mermaid" => Some(Self::Mermaid),
            "dot" | "graphviz" | "gv" => Some(Self::Dot),
            "wavedrom" | "wave" | "wavejson" => Some(Self::Wavedrom),
            "vega-lite" | "vl" => Some(Self::VegaLite),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Mermaid => "mermaid",
            Self::Dot => "dot",
            Self::Wavedrom => "wavedrom",
            Self::VegaLite => "vega-lite",
        }
    }
}

impl fmt::Display for DiagramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Turns diagram source into image bytes.
///
/// `Ok(None)` means the renderer declined the block; it is kept verbatim.
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    fn name(&self) -> &str;

    async fn render(
        &self,
        source: &str,
        ctx: RenderContext<'_>,
    ) -> Result<Option<RenderResult>, RenderError>;
}

#[derive(Clone, Default)]
pub struct DiagramRegistry {
    renderers: BTreeMap<DiagramKind, Arc<dyn DiagramRenderer>>,
}

impl DiagramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: DiagramKind, renderer: Arc<dyn DiagramRenderer>) -> &mut Self {
        self.renderers.insert(kind, renderer);
        self
    }

    pub fn with(mut self, kind: DiagramKind, renderer: Arc<dyn DiagramRenderer>) -> Self {
        self.register(kind, renderer);
        self
    }

    pub fn get(&self, kind: DiagramKind) -> Option<&Arc<dyn DiagramRenderer>> {
        self.renderers.get(&kind)
    }

    pub fn for_lang(&self, lang: &str) -> Option<&Arc<dyn DiagramRenderer>> {
        DiagramKind::from_lang(lang).and_then(|kind| self.get(kind))
    }

    pub fn kinds(&self) -> impl Iterator<Item = DiagramKind> + '_ {
        self.renderers.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }
}

impl fmt::Debug for DiagramRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}

/// ER relationship labels are drawn on dark edges.
const ER_EDGE_LABEL_CSS: &str = ".edgeLabel text{fill:#fff;}";

/// Final bytes for a blob: SVG output is made XML-safe and Mermaid ER
/// diagrams get their edge label colour.
fn finish_image(kind: Option<DiagramKind>, source: &str, mime: &str, data: Vec<u8>) -> Vec<u8> {
    if mime != SVG_MIME {
        return data;
    }
    let svg = match String::from_utf8(data) {
        Ok(svg) => svg,
        Err(e) => return e.into_bytes(),
    };
    let svg = sanitize_svg_for_xml(&svg).into_owned();
    let svg = match kind {
        Some(DiagramKind::Mermaid) if is_er_diagram(source) => inject_svg_style(&svg, ER_EDGE_LABEL_CSS),
        _ => svg,
    };
    svg.into_bytes()
}

/// Rewritten markdown plus the blobs it references.
#[derive(Debug)]
pub struct Extraction {
    pub text: String,
    pub blobs: PendingBlobs,
}

/// Replaces every diagram fence that renders successfully with an image.
///
/// Returns `None` when `generation` went stale; blobs allocated by this call
/// are revoked by then.
pub async fn extract_diagrams(
    text: &str,
    generation: &Generation,
    registry: &DiagramRegistry,
    store: Arc<dyn BlobStore>,
    options: &RenderOptions,
) -> Option<Extraction> {
    let text = normalize_newlines(text);
    let text: &str = &text;
    let mut blobs = PendingBlobs::new(store);
    let mut out = String::with_capacity(text.len());
    let mut last = 0usize;

    for block in scan_fences(text) {
        out.push_str(&text[last..block.start]);
        last = block.end;
        let source = block.source(text);

        let Some(renderer) = registry.for_lang(&block.lang) else {
            out.push_str(source);
            continue;
        };

        if !generation.is_current() {
            debug!("Diagram extraction superseded before {} block", renderer.name());
            return None;
        }

        let hint = block.hint.as_deref().unwrap_or_default().to_ascii_lowercase();
        let ctx = RenderContext {
            md_text: text,
            match_index: block.start,
            token: generation.token(),
            format_hint: &hint,
        };
        let rendered = renderer.render(&block.content, ctx).await;

        if !generation.is_current() {
            debug!("Diagram extraction superseded during {} render", renderer.name());
            return None;
        }

        let result = match rendered {
            Ok(Some(result)) if result.is_complete() => result,
            Ok(_) => {
                debug!("{} returned no image; keeping block", renderer.name());
                out.push_str(source);
                continue;
            }
            Err(e) => {
                let first_line = block.content.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
                warn!("{} render failed; skipping block {:?}: {e}", renderer.name(), preview(first_line, 60));
                out.push_str(source);
                continue;
            }
        };

        let size = result.size_or(options.default_size);
        let class_name = result.class_name.as_deref().unwrap_or("diagram-img");
        let alt = result
            .alt
            .clone()
            .unwrap_or_else(|| format!("{} diagram", renderer.name()));
        let data = finish_image(DiagramKind::from_lang(&block.lang), &block.content, &result.mime, result.data);
        let handle = blobs.create(&result.mime, data);
        let html = diagram_image_html(handle.as_str(), size, class_name, &alt);
        place_block_image(&mut out, text, block.start, &block.indent, &html);
    }

    out.push_str(&text[last..]);
    Some(Extraction { text: out, blobs })
}
