//! Document classification and conversion into model-ready units.
//!
//! An upload becomes either a sequence of encoded images (rendered or uploaded) or a sequence
//! of text pages when every rendering tier fails.

mod pipeline;

pub use pipeline::{DocumentConverter, convert_document};

use std::fmt;
use std::path::Path;

use crate::error::DocumentError;

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Pdf,
    Jpeg,
    Png,
    Tiff,
}

impl DocumentKind {
    /// Map a declared media type.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "application/pdf" | "application/x-pdf" => Some(Self::Pdf),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/tiff" | "image/tif" => Some(Self::Tiff),
            _ => None,
        }
    }

    /// Map a file extension.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    /// Detect the format from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if is_pdf(bytes) {
            return Some(Self::Pdf);
        }
        match image::guess_format(bytes).ok()? {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Tiff => Some(Self::Tiff),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Tiff => "image/tiff",
        }
    }

    /// Image encoding for image uploads, `None` for PDF.
    pub fn image_encoding(self) -> Option<ImageEncoding> {
        match self {
            Self::Pdf => None,
            Self::Jpeg => Some(ImageEncoding::Jpeg),
            Self::Png => Some(ImageEncoding::Png),
            Self::Tiff => Some(ImageEncoding::Tiff),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// `%PDF` may be preceded by a little junk in the first kilobyte.
fn is_pdf(bytes: &[u8]) -> bool {
    bytes
        .windows(4)
        .take(1024)
        .any(|window| window == b"%PDF")
}

/// Classify an upload from its declared media type, falling back to byte sniffing.
pub fn classify(bytes: &[u8], declared_type: Option<&str>) -> Result<DocumentKind, DocumentError> {
    if let Some(kind) = declared_type.and_then(DocumentKind::from_mime) {
        return Ok(kind);
    }
    DocumentKind::sniff(bytes).ok_or_else(|| {
        DocumentError::UnsupportedFormat(
            declared_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or("unrecognized content")
                .to_string(),
        )
    })
}

/// Encoding of an image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageEncoding {
    Png,
    Jpeg,
    Tiff,
}

impl ImageEncoding {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Tiff => "image/tiff",
        }
    }

    pub fn format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Tiff => image::ImageFormat::Tiff,
        }
    }
}

/// An encoded image ready to be sent to a vision model.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub encoding: ImageEncoding,
    pub width: u32,
    pub height: u32,
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("bytes", &self.data.len())
            .field("encoding", &self.encoding)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Kind of every unit in a [`Conversion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Image,
    Text,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "image",
            Self::Text => "text",
        })
    }
}

/// One page worth of model input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConversionUnit {
    Image(EncodedImage),
    Text(String),
}

/// Rendering tiers, in cascade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Primary rasterizer.
    Primary,
    /// Page-tree repair followed by one primary retry.
    Repair,
    /// Secondary rasterizer.
    Secondary,
    /// Text-layer extraction.
    TextFallback,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Repair => "repair",
            Self::Secondary => "secondary",
            Self::TextFallback => "text-fallback",
        })
    }
}

/// One entry of the attempt trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierAttempt {
    pub tier: Tier,
    pub succeeded: bool,
    pub message: String,
}

/// Non-empty sequence of units of a single kind.
#[derive(Debug, Clone)]
pub struct Conversion {
    kind: UnitKind,
    units: Vec<ConversionUnit>,
    trail: Vec<TierAttempt>,
}

impl Conversion {
    /// `None` when `images` is empty.
    pub fn from_images(images: Vec<EncodedImage>, trail: Vec<TierAttempt>) -> Option<Self> {
        if images.is_empty() {
            return None;
        }
        Some(Self {
            kind: UnitKind::Image,
            units: images.into_iter().map(ConversionUnit::Image).collect(),
            trail,
        })
    }

    /// `None` when `pages` is empty.
    pub fn from_text_pages(pages: Vec<String>, trail: Vec<TierAttempt>) -> Option<Self> {
        if pages.is_empty() {
            return None;
        }
        Some(Self {
            kind: UnitKind::Text,
            units: pages.into_iter().map(ConversionUnit::Text).collect(),
            trail,
        })
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Never true for a constructed conversion.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Attempts made before (and including) the one that succeeded. Empty for image uploads.
    pub fn trail(&self) -> &[TierAttempt] {
        &self.trail
    }

    pub fn images(&self) -> Vec<&EncodedImage> {
        self.units
            .iter()
            .filter_map(|unit| match unit {
                ConversionUnit::Image(image) => Some(image),
                ConversionUnit::Text(_) => None,
            })
            .collect()
    }

    pub fn text_pages(&self) -> Vec<&str> {
        self.units
            .iter()
            .filter_map(|unit| match unit {
                ConversionUnit::Text(text) => Some(text.as_str()),
                ConversionUnit::Image(_) => None,
            })
            .collect()
    }
}
