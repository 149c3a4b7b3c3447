use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Pixel dimensions of a rendered image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Builds a size from renderer-reported floats, rounding up.
    ///
    /// Returns `None` unless both values are finite and positive.
    pub fn from_f64(width: f64, height: f64) -> Option<Self> {
        Some(Self {
            width: ceil_dimension(width)?,
            height: ceil_dimension(height)?,
        })
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

pub(crate) fn ceil_dimension(value: f64) -> Option<u32> {
    (value.is_finite() && value > 0.0).then(|| value.ceil().min(u32::MAX as f64) as u32)
}

/// What a diagram renderer hands back for one block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderResult {
    pub mime: String,
    pub data: Vec<u8>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub class_name: Option<String>,
    pub alt: Option<String>,
}

impl RenderResult {
    pub fn svg(svg: impl Into<String>) -> Self {
        Self {
            mime: super::svg::SVG_MIME.to_string(),
            data: svg.into().into_bytes(),
            ..Self::default()
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// A result with no MIME type or no bytes counts as a failed render.
    pub fn is_complete(&self) -> bool {
        !self.mime.is_empty() && !self.data.is_empty()
    }

    /// Explicit dimensions where usable, `fallback` per missing dimension.
    pub fn size_or(&self, fallback: ImageSize) -> ImageSize {
        ImageSize::new(
            self.width.and_then(ceil_dimension).unwrap_or(fallback.width),
            self.height.and_then(ceil_dimension).unwrap_or(fallback.height),
        )
    }
}

/// Per-call information handed to a diagram renderer.
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    /// The full document being rendered.
    pub md_text: &'a str,
    /// Byte offset of the fence block in `md_text`.
    pub match_index: usize,
    pub token: u64,
    /// Lower-cased second info token of the fence, e.g. `png`.
    pub format_hint: &'a str,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{renderer} failed: {message}")]
    Failed { renderer: String, message: String },

    #[error("{0} renderer is unavailable")]
    Unavailable(String),

    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    ProcessExit {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Renderer produced invalid UTF-8 output")]
    InvalidOutput(#[from] std::string::FromUtf8Error),
}

impl RenderError {
    pub fn failed(renderer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            renderer: renderer.into(),
            message: message.into(),
        }
    }
}
