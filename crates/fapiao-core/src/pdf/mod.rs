//! PDF rasterization, repair and text-layer extraction.

mod render;
mod repair;
mod text;

pub use render::{MutoolRasterizer, PopplerRasterizer};
pub use repair::repair_pdf;
pub use text::{PageTextSource, PdfTextExtractor, extract_pdf_text};

use std::fmt;

use lopdf::Document;
use thiserror::Error;

use crate::convert::EncodedImage;
use crate::error::PdfError;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Rendering parameters for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Resolution in dots per inch.
    pub dpi: u32,
    /// Maximum number of pages to render, from the first.
    pub max_pages: usize,
    /// Decoder allocation limit per page, in bytes.
    pub max_image_bytes: u64,
}

/// How a rasterization attempt failed. Decides the next tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The file does not parse as a PDF.
    Syntax,
    /// The backend rejected the file as damaged.
    Corrupt,
    /// The backend is not installed or could not be started.
    Unavailable,
    /// Page enumeration failed or produced nothing.
    PageCount,
    /// The backend or the decoder ran out of memory.
    OutOfMemory,
}

impl FailureClass {
    /// Failures that a page-tree repair may fix.
    pub fn is_structural(self) -> bool {
        matches!(self, Self::Syntax | Self::Corrupt)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntax => "syntax",
            Self::Corrupt => "corrupt",
            Self::Unavailable => "unavailable",
            Self::PageCount => "page count",
            Self::OutOfMemory => "out of memory",
        })
    }
}

/// A failed rasterization attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{class}: {message}")]
pub struct RenderFailure {
    pub class: FailureClass,
    pub message: String,
}

impl RenderFailure {
    pub fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

/// A PDF page renderer.
pub trait Rasterizer: Send + Sync {
    /// Backend name for logs and the attempt trail.
    fn name(&self) -> &str;

    /// Render up to `options.max_pages` pages, in page order.
    fn rasterize(
        &self,
        pdf: &[u8],
        options: &RenderOptions,
    ) -> std::result::Result<Vec<EncodedImage>, RenderFailure>;
}

/// Open the page sequence with lopdf.
///
/// Parse errors are [`FailureClass::Syntax`]. A page tree with no reachable pages is
/// [`FailureClass::Corrupt`], so the document goes through repair.
pub fn page_count(pdf: &[u8]) -> std::result::Result<usize, RenderFailure> {
    let doc = Document::load_mem(pdf)
        .map_err(|e| RenderFailure::new(FailureClass::Syntax, e.to_string()))?;
    let pages = doc.get_pages().len();
    if pages == 0 {
        return Err(RenderFailure::new(FailureClass::Corrupt, "page tree has no usable pages"));
    }
    Ok(pages)
}
