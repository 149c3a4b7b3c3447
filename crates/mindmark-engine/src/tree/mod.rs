//! Canonical markdown to mind-map tree.

pub mod layout;
pub mod markdown;

pub use layout::unwrap_paragraph_wrappers;
pub use markdown::MarkdownTreeTransformer;

use serde::Serialize;
use thiserror::Error;

/// One node of the visualization tree. `content` is inline HTML.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TreeNode {
    pub content: String,
    pub depth: usize,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Recomputes `depth` for this node and all descendants.
    pub fn assign_depths(&mut self, depth: usize) {
        self.depth = depth;
        for child in &mut self.children {
            child.assign_depths(depth + 1);
        }
    }

    /// Depth-first iterator over this node and its descendants.
    pub fn iter(&self) -> impl Iterator<Item = &TreeNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("Markdown produced no renderable content")]
    Empty,
    #[error("Transform failed: {0}")]
    Failed(String),
}

/// Turns canonical markdown into the tree handed to the visualization.
pub trait TreeTransformer: Send + Sync {
    fn transform(&self, markdown: &str) -> Result<TreeNode, TransformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iter_is_depth_first_preorder() {
        let mut root = TreeNode::new("root");
        let mut a = TreeNode::new("a");
        a.children.push(TreeNode::new("a1"));
        root.children.push(a);
        root.children.push(TreeNode::new("b"));

        let order: Vec<_> = root.iter().map(|n| n.content.as_str()).collect();
        assert_eq!(order, ["root", "a", "a1", "b"]);
        assert_eq!(root.count(), 4);
    }

    #[test]
    fn assign_depths_walks_children() {
        let mut root = TreeNode::new("root");
        let mut a = TreeNode::new("a");
        a.children.push(TreeNode::new("a1"));
        root.children.push(a);
        root.assign_depths(0);
        assert_eq!(root.children[0].children[0].depth, 2);
    }
}
