//! Error types for the fapiao-core library.

use thiserror::Error;

/// Main error type for the fapiao library.
#[derive(Error, Debug)]
pub enum FapiaoError {
    /// Document classification or conversion error.
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Invoice extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Model call error.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors surfaced by the document conversion pipeline.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The bytes are not a PDF, JPEG, PNG or TIFF.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// An image upload that cannot be decoded.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Every rasterization tier failed and text degradation produced nothing.
    #[error("rendering failed after {attempts} attempt(s): {reason}")]
    RenderingFailure { attempts: usize, reason: String },
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Rebuilding the page tree failed.
    #[error("failed to repair PDF: {0}")]
    Repair(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,
}

/// Errors related to invoice field extraction.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// There is no text to extract from.
    #[error("no text to extract from")]
    EmptyText,

    /// The input kind is not handled by the selected strategy.
    #[error("{0}")]
    UnsupportedInput(String),

    /// The model answered with something that is not a JSON object.
    #[error("unparseable model response: {0}")]
    InvalidResponse(String),

    /// The model call itself failed.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors raised by a model client.
#[derive(Error, Debug)]
pub enum ModelError {
    /// No client is configured for model-based extraction.
    #[error("no model client configured")]
    NotConfigured,

    /// Transport or HTTP-level failure.
    #[error("model request failed: {0}")]
    Request(String),

    /// The service replied without any content.
    #[error("model returned an empty response")]
    EmptyResponse,
}

/// A capitalized numeral string with no recognizable digit or unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no recognizable numeral in {input:?}")]
pub struct ConversionError {
    pub input: String,
}

/// Result type for the fapiao library.
pub type Result<T> = std::result::Result<T, FapiaoError>;
