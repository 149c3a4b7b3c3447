//! Text-level markdown handling: fence scanning, line classification, the
//! structural normalizer and Mermaid label sanitizing.

pub mod canonical;
pub mod classify;
pub mod fence_lang;
pub mod fences;
pub mod list_context;
pub mod mermaid;
pub mod normalize;
pub mod text;

#[cfg(test)]
mod tests;

pub use canonical::canonicalize;
pub use classify::{LineClass, LineKind, MarkdownLineClassifier};
pub use fence_lang::normalize_fence_lang;
pub use fences::{FenceBlock, FenceChar, FenceOpening, scan_fences, unwrap_container_fence};
pub use list_context::{
    ListContext, append_inline_to_last_list_item, compute_safe_indent, get_list_context,
};
pub use mermaid::{LabelOptions, sanitize_mermaid_fences, sanitize_mermaid_label, sanitize_mermaid_source_labels};
pub use normalize::{HeadingState, normalize};
