//! Sequences one render attempt per edit and commits only the latest.
//!
//! Overlapping [`RenderOrchestrator::render`] calls are allowed. Each call
//! draws a [`Generation`]; once a newer call starts, the older one stops at
//! its next await boundary, drops its pending blobs and leaves the
//! visualization alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use thiserror::Error;

use super::RenderOptions;
use super::blobs::{BlobHandle, BlobStore, CommittedBlobs, PendingBlobs};
use super::diagrams::{DiagramRegistry, extract_diagrams};
use super::flatten::{LineRasterizer, flatten_math_lines};
use super::generation::{Generation, GenerationCounter};
use super::math::{MathRenderer, extract_math};
use crate::parsing::canonicalize;
use crate::tree::{MarkdownTreeTransformer, TransformError, TreeNode, TreeTransformer};

#[derive(Debug, Error)]
pub enum VisualizationError {
    #[error("Visualization rejected the tree: {0}")]
    Rejected(String),
    #[error("Images failed to load: {0}")]
    Images(String),
}

/// The tree-drawing engine the orchestrator drives.
#[async_trait]
pub trait Visualization: Send {
    async fn set_data(&mut self, root: &TreeNode) -> Result<(), VisualizationError>;

    /// Resolves once every image in the current tree has loaded or failed.
    async fn wait_for_images(&mut self) -> Result<(), VisualizationError>;

    /// Post-draw fixes such as [`crate::tree::unwrap_paragraph_wrappers`].
    /// Returns whether anything changed.
    fn fix_layout(&mut self) -> bool {
        false
    }

    async fn fit(&mut self) -> Result<(), VisualizationError>;
}

/// Yields until the visualization had a chance to draw a frame.
#[async_trait]
pub trait FrameClock: Send + Sync {
    async fn next_frame(&self);
}

#[derive(Debug, Clone)]
pub struct TokioFrameClock {
    interval: Duration,
}

impl TokioFrameClock {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl FrameClock for TokioFrameClock {
    async fn next_frame(&self) {
        tokio::time::sleep(self.interval).await;
    }
}

/// Frames that only yield to the scheduler. For headless use and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateFrames;

#[async_trait]
impl FrameClock for ImmediateFrames {
    async fn next_frame(&self) {
        tokio::task::yield_now().await;
    }
}

/// Where the text to render comes from, e.g. an editor buffer.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn current_content(&self) -> Option<String>;
}

/// Receives canonical text, e.g. to replace an editor buffer.
pub trait ContentSink: Send + Sync {
    fn load_content(&self, text: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderStage {
    #[default]
    Idle,
    Normalizing,
    MathExtracting,
    DiagramExtracting,
    Transforming,
    Committing,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Visualization(#[from] VisualizationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Blank input; nothing was touched.
    Empty,
    /// A newer render started before this one could commit.
    Superseded,
    Committed { images: usize, first_render: bool },
}

pub struct RenderOrchestrator<V> {
    counter: GenerationCounter,
    visualization: tokio::sync::Mutex<V>,
    store: Arc<dyn BlobStore>,
    committed: Mutex<CommittedBlobs>,
    stage: Mutex<RenderStage>,
    rendered: AtomicBool,
    diagrams: DiagramRegistry,
    math: Option<Arc<dyn MathRenderer>>,
    rasterizer: Option<Arc<dyn LineRasterizer>>,
    transformer: Arc<dyn TreeTransformer>,
    clock: Arc<dyn FrameClock>,
    options: RenderOptions,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V: Visualization> RenderOrchestrator<V> {
    pub fn new(visualization: V, store: Arc<dyn BlobStore>) -> Self {
        let options = RenderOptions::default();
        Self {
            counter: GenerationCounter::new(),
            visualization: tokio::sync::Mutex::new(visualization),
            committed: Mutex::new(CommittedBlobs::new(Arc::clone(&store))),
            store,
            stage: Mutex::new(RenderStage::Idle),
            rendered: AtomicBool::new(false),
            diagrams: DiagramRegistry::new(),
            math: None,
            rasterizer: None,
            transformer: Arc::new(MarkdownTreeTransformer::new()),
            clock: Arc::new(TokioFrameClock::new(options.frame_interval)),
            options,
        }
    }

    /// Replaces the options and the frame clock derived from them.
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.clock = Arc::new(TokioFrameClock::new(options.frame_interval));
        self.options = options;
        self
    }

    pub fn with_diagrams(mut self, diagrams: DiagramRegistry) -> Self {
        self.diagrams = diagrams;
        self
    }

    pub fn with_math(mut self, math: Arc<dyn MathRenderer>) -> Self {
        self.math = Some(math);
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn LineRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn TreeTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn FrameClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn stage(&self) -> RenderStage {
        *lock(&self.stage)
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Handles of the blobs referenced by the committed tree.
    pub fn committed_blobs(&self) -> Vec<BlobHandle> {
        lock(&self.committed).handles().to_vec()
    }

    pub async fn visualization(&self) -> tokio::sync::MutexGuard<'_, V> {
        self.visualization.lock().await
    }

    /// Revokes the committed blobs and invalidates any render in flight.
    pub fn clear(&self) {
        let generation = self.counter.next();
        lock(&self.committed).clear();
        self.rendered.store(false, Ordering::SeqCst);
        *lock(&self.stage) = RenderStage::Idle;
        debug!("Cleared render state at generation {}", generation.token());
    }

    /// Canonical text for the editor, see [`canonicalize`]. `sink` receives
    /// it before it is returned.
    pub fn normalize_for_editor(&self, text: &str, sink: &dyn ContentSink) -> String {
        let canonical = canonicalize(text);
        sink.load_content(&canonical);
        canonical
    }

    pub async fn render_from(&self, source: &dyn ContentSource) -> Result<RenderOutcome, OrchestratorError> {
        match source.current_content().await {
            Some(text) => self.render(&text).await,
            None => Ok(RenderOutcome::Empty),
        }
    }

    pub async fn render(&self, text: &str) -> Result<RenderOutcome, OrchestratorError> {
        if text.trim().is_empty() {
            return Ok(RenderOutcome::Empty);
        }

        let generation = self.counter.next();
        debug!("Render {} started ({} bytes)", generation.token(), text.len());

        let result = self.run(text, &generation).await;
        if generation.is_current() {
            self.enter(&generation, RenderStage::Idle);
        }
        result
    }

    async fn run(&self, text: &str, generation: &Generation) -> Result<RenderOutcome, OrchestratorError> {
        let Some((markdown, blobs)) = self.prepare(text, generation).await else {
            return Ok(self.superseded(generation));
        };

        self.enter(generation, RenderStage::Transforming);
        let root = match self.transformer.transform(&markdown) {
            Ok(root) => root,
            Err(e) => {
                debug!("Render {} failed to transform: {e}", generation.token());
                blobs.release();
                return Err(e.into());
            }
        };

        let images = markdown.matches("<img").count();
        self.commit(generation, root, blobs, images).await
    }

    /// Produces the final markdown and the blobs it references, or `None`
    /// once superseded.
    async fn prepare(&self, text: &str, generation: &Generation) -> Option<(String, PendingBlobs)> {
        self.enter(generation, RenderStage::Normalizing);
        let canonical = canonicalize(text);
        if !generation.is_current() {
            return None;
        }

        self.enter(generation, RenderStage::MathExtracting);
        let mut markdown = extract_math(&canonical, generation, self.math.as_deref(), &self.options).await?;
        let mut blobs = PendingBlobs::new(Arc::clone(&self.store));

        if self.options.flatten_math_lines
            && let Some(rasterizer) = &self.rasterizer
        {
            let flattened =
                flatten_math_lines(&markdown, generation, rasterizer.as_ref(), Arc::clone(&self.store)).await?;
            markdown = flattened.text;
            blobs.absorb(flattened.blobs);
        }

        self.enter(generation, RenderStage::DiagramExtracting);
        let extraction = extract_diagrams(
            &markdown,
            generation,
            &self.diagrams,
            Arc::clone(&self.store),
            &self.options,
        )
        .await?;
        blobs.absorb(extraction.blobs);
        Some((extraction.text, blobs))
    }

    async fn commit(
        &self,
        generation: &Generation,
        root: TreeNode,
        blobs: PendingBlobs,
        images: usize,
    ) -> Result<RenderOutcome, OrchestratorError> {
        let mut visualization = self.visualization.lock().await;
        if !generation.is_current() {
            return Ok(self.superseded(generation));
        }

        self.enter(generation, RenderStage::Committing);
        // The displayed tree keeps its blobs until the new one is accepted;
        // on error `blobs` drops and revokes only this attempt's set.
        visualization.set_data(&root).await?;
        lock(&self.committed).commit(blobs);
        let first_render = !self.rendered.swap(true, Ordering::SeqCst);

        self.clock.next_frame().await;
        self.clock.next_frame().await;
        if !generation.is_current() {
            return Ok(self.superseded(generation));
        }
        visualization.fix_layout();

        if images > 0 {
            visualization.wait_for_images().await?;
            if !generation.is_current() {
                return Ok(self.superseded(generation));
            }
            visualization.set_data(&root).await?;
            self.clock.next_frame().await;
            if !generation.is_current() {
                return Ok(self.superseded(generation));
            }
            visualization.fix_layout();
        }

        visualization.fit().await?;
        info!(
            "Rendered {} nodes with {images} images (generation {})",
            root.count(),
            generation.token()
        );
        Ok(RenderOutcome::Committed { images, first_render })
    }

    fn enter(&self, generation: &Generation, stage: RenderStage) {
        if generation.is_current() {
            debug!("Render {}: {stage:?}", generation.token());
            *lock(&self.stage) = stage;
        }
    }

    fn superseded(&self, generation: &Generation) -> RenderOutcome {
        debug!(
            "Render {} superseded by {}",
            generation.token(),
            self.counter.pending()
        );
        RenderOutcome::Superseded
    }
}
