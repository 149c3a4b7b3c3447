use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use mindmark_engine::render::{ContentSink, ContentSource};

/// In-memory document buffer standing in for an editor.
#[derive(Debug, Default)]
pub struct Buffer {
    text: Mutex<String>,
}

impl Buffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(text.into()),
        }
    }

    pub fn text(&self) -> String {
        self.text.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl ContentSource for Buffer {
    async fn current_content(&self) -> Option<String> {
        let text = self.text();
        (!text.trim().is_empty()).then_some(text)
    }
}

impl ContentSink for Buffer {
    fn load_content(&self, text: &str) {
        *self.text.lock().unwrap_or_else(PoisonError::into_inner) = text.to_string();
    }
}
