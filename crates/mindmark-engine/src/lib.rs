pub mod parsing;
pub mod render;
pub mod tree;

// Re-export key types for easier usage
pub use parsing::{canonicalize, normalize, normalize_fence_lang, scan_fences};
pub use render::{
    BlobStore, DiagramKind, DiagramRegistry, DiagramRenderer, MathRenderer, MemoryBlobStore,
    RenderOptions, RenderOrchestrator, RenderOutcome, Visualization,
};
pub use tree::{MarkdownTreeTransformer, TreeNode, TreeTransformer};
