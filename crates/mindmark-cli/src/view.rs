use async_trait::async_trait;
use mindmark_engine::render::blobs::collect_blob_urls;
use mindmark_engine::render::{BlobHandle, MemoryBlobStore, Visualization, VisualizationError};
use mindmark_engine::tree::{TreeNode, unwrap_paragraph_wrappers};

/// Headless visualization that keeps the last tree for printing as JSON.
#[derive(Debug, Default)]
pub struct JsonVisualization {
    root: Option<TreeNode>,
}

impl JsonVisualization {
    pub fn take_tree(&mut self) -> Option<TreeNode> {
        self.root.take()
    }
}

#[async_trait]
impl Visualization for JsonVisualization {
    async fn set_data(&mut self, root: &TreeNode) -> Result<(), VisualizationError> {
        self.root = Some(root.clone());
        Ok(())
    }

    // Blob bytes are already in memory
    async fn wait_for_images(&mut self) -> Result<(), VisualizationError> {
        Ok(())
    }

    fn fix_layout(&mut self) -> bool {
        self.root.as_mut().is_some_and(unwrap_paragraph_wrappers)
    }

    async fn fit(&mut self) -> Result<(), VisualizationError> {
        Ok(())
    }
}

/// Replaces blob URLs in every node with `data:` URLs so the JSON stands
/// on its own after the process exits.
pub fn embed_blobs(node: &mut TreeNode, store: &MemoryBlobStore) {
    for url in collect_blob_urls(&node.content) {
        if let Some(blob) = BlobHandle::parse(&url).and_then(|handle| store.get(&handle)) {
            node.content = node.content.replace(&url, &blob.data_url());
        }
    }
    for child in &mut node.children {
        embed_blobs(child, store);
    }
}
