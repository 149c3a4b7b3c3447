//! # Render Pipeline
//!
//! Pre-renders diagram fences and math into images, then hands canonical
//! markdown to the tree transform and the visualization.
//!
//! ## Architecture
//!
//! ```text
//! text ─► normalize ─► fence langs ─► math ─► (flatten) ─► diagrams ─► tree ─► visualization
//!                                      │          │            │
//!                                      └──────────┴── blobs ───┴─► commit / revoke
//! ```
//!
//! Every stage that awaits a renderer checks its [`Generation`] before and
//! after the await; a superseded attempt drops its [`PendingBlobs`], which
//! revokes everything it allocated.

pub mod blobs;
pub mod diagrams;
pub mod flatten;
pub mod generation;
pub mod markup;
pub mod math;
pub mod orchestrator;
pub mod process;
pub mod result;
pub mod svg;

use std::time::Duration;

pub use blobs::{BlobHandle, BlobStore, CommittedBlobs, MemoryBlobStore, PendingBlobs};
pub use diagrams::{DiagramKind, DiagramRegistry, DiagramRenderer, Extraction, extract_diagrams};
pub use flatten::{LineFragment, LineRasterizer, SvgLineRasterizer, flatten_math_lines};
pub use generation::{Generation, GenerationCounter};
pub use math::{MathRenderer, extract_math, should_render_inline_math};
pub use orchestrator::{
    ContentSink, ContentSource, FrameClock, ImmediateFrames, OrchestratorError, RenderOrchestrator,
    RenderOutcome, RenderStage, TokioFrameClock, Visualization, VisualizationError,
};
pub use process::{ProcessMathRenderer, ProcessRenderer};
pub use result::{ImageSize, RenderContext, RenderError, RenderResult};

/// Tunables shared by the extractors and the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Diagram size when the renderer reports none.
    pub default_size: ImageSize,
    /// Math size when the SVG declares none.
    pub math_fallback_size: ImageSize,
    /// Font size that `em`/`ex` SVG lengths are relative to.
    pub base_font_px: f64,
    pub flatten_math_lines: bool,
    /// Length of one frame tick between visualization updates.
    pub frame_interval: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            default_size: svg::DEFAULT_SVG_SIZE,
            math_fallback_size: ImageSize::new(120, 40),
            base_font_px: 16.0,
            flatten_math_lines: false,
            frame_interval: Duration::from_millis(16),
        }
    }
}
