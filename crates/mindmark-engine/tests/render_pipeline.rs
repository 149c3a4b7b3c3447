use std::sync::Arc;

use async_trait::async_trait;
use mindmark_engine::render::{
    DiagramKind, DiagramRegistry, DiagramRenderer, ImmediateFrames, MathRenderer, MemoryBlobStore,
    RenderContext, RenderError, RenderOptions, RenderOrchestrator, RenderOutcome, RenderResult,
    SvgLineRasterizer, Visualization, VisualizationError,
};
use mindmark_engine::tree::{TreeNode, unwrap_paragraph_wrappers};
use pretty_assertions::assert_eq;

#[derive(Default)]
struct HeadlessVisualization {
    root: Option<TreeNode>,
    fits: usize,
}

#[async_trait]
impl Visualization for HeadlessVisualization {
    async fn set_data(&mut self, root: &TreeNode) -> Result<(), VisualizationError> {
        self.root = Some(root.clone());
        Ok(())
    }

    async fn wait_for_images(&mut self) -> Result<(), VisualizationError> {
        Ok(())
    }

    fn fix_layout(&mut self) -> bool {
        self.root.as_mut().is_some_and(unwrap_paragraph_wrappers)
    }

    async fn fit(&mut self) -> Result<(), VisualizationError> {
        self.fits += 1;
        Ok(())
    }
}

struct BoxDiagram;

#[async_trait]
impl DiagramRenderer for BoxDiagram {
    fn name(&self) -> &str {
        "box"
    }

    async fn render(&self, source: &str, ctx: RenderContext<'_>) -> Result<Option<RenderResult>, RenderError> {
        if source.contains("broken") {
            return Err(RenderError::failed("box", "syntax error"));
        }
        assert!(ctx.md_text[ctx.match_index..].trim_start().starts_with("```"));
        Ok(Some(
            RenderResult::svg(format!("<svg><text>{source}</text></svg>")).with_size(64.0, 32.5),
        ))
    }
}

struct PlainMath;

#[async_trait]
impl MathRenderer for PlainMath {
    async fn tex_to_svg(&self, expr: &str, _display: bool) -> Result<String, RenderError> {
        Ok(format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="2ex" height="1.5ex" viewBox="0 0 100 75"><desc>{expr}</desc></svg>"#
        ))
    }
}

fn orchestrator(store: &Arc<MemoryBlobStore>, options: RenderOptions) -> RenderOrchestrator<HeadlessVisualization> {
    RenderOrchestrator::new(HeadlessVisualization::default(), store.clone())
        .with_options(options)
        .with_diagrams(DiagramRegistry::new().with(DiagramKind::Mermaid, Arc::new(BoxDiagram)))
        .with_math(Arc::new(PlainMath))
        .with_rasterizer(Arc::new(SvgLineRasterizer::default()))
        .with_clock(Arc::new(ImmediateFrames))
}

fn contents(root: &TreeNode) -> Vec<String> {
    root.iter().map(|n| n.content.clone()).collect()
}

#[tokio::test]
async fn renders_loose_markdown_with_diagrams_and_math() {
    let store = Arc::new(MemoryBlobStore::new());
    let orch = orchestrator(&store, RenderOptions::default());
    let input = "# Notes\nSome intro\n\n- Energy $E = mc^2$\n- Flow\n```mermaid\nA-->B\n```\n- Bad\n```mermaid\nbroken\n```\n";

    let outcome = orch.render(input).await.unwrap();

    assert_eq!(outcome, RenderOutcome::Committed { images: 2, first_render: true });
    assert_eq!(store.live_count(), 1);

    let vis = orch.visualization().await;
    let root = vis.root.as_ref().unwrap();
    let nodes = contents(root);
    assert_eq!(root.content, "Notes");
    assert!(nodes.contains(&"Some intro".to_string()));
    assert!(nodes.iter().any(|c| c.starts_with("Energy <img class=\"math-img\"")));
    assert!(nodes.iter().any(|c| c.starts_with("Flow <span class=\"diagram-wrap\"")
        && c.contains("width=\"64\" height=\"33\"")));
    assert!(nodes.iter().any(|c| c.contains("language-mermaid") && c.contains("broken")));
    assert_eq!(vis.fits, 1);
}

#[tokio::test]
async fn flattening_replaces_mixed_math_lines() {
    let store = Arc::new(MemoryBlobStore::new());
    let options = RenderOptions {
        flatten_math_lines: true,
        ..RenderOptions::default()
    };
    let orch = orchestrator(&store, options);

    let outcome = orch.render("# Physics\n- Energy $E = mc^2$ holds\n- $x$\n").await.unwrap();

    assert_eq!(outcome, RenderOutcome::Committed { images: 2, first_render: true });
    assert_eq!(orch.committed_blobs().len(), 1);
    let vis = orch.visualization().await;
    let nodes = contents(vis.root.as_ref().unwrap());
    assert!(nodes.iter().any(|c| c.starts_with("<img class=\"math-line-img\"")));
    assert!(nodes.iter().any(|c| c.starts_with("<img class=\"math-img\"")));
}

#[tokio::test]
async fn re_rendering_keeps_only_latest_blobs_alive() {
    let store = Arc::new(MemoryBlobStore::new());
    let orch = orchestrator(&store, RenderOptions::default());
    let doc = "# D\n```mermaid\nA\n```\n```mermaid\nB\n```\n";

    for _ in 0..3 {
        orch.render(doc).await.unwrap();
    }

    assert_eq!(store.live_count(), 2);
    assert_eq!(store.revocations().len(), 4);
    for handle in orch.committed_blobs() {
        assert!(store.get(&handle).is_some());
    }

    orch.clear();
    assert_eq!(store.live_count(), 0);
    assert_eq!(store.revocations().len(), 6);
}

#[test]
fn tree_serializes_for_front_ends() {
    let mut root = TreeNode::new("Root");
    root.children.push(TreeNode::new("<b>child</b>"));
    root.assign_depths(0);

    let json = serde_json::to_value(&root).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "content": "Root",
            "depth": 0,
            "children": [{ "content": "<b>child</b>", "depth": 1, "children": [] }]
        })
    );
}
