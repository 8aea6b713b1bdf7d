//! Core library for Chinese fapiao processing.
//!
//! This crate provides:
//! - Field extraction from fapiao text (invoice number, date, buyer/seller, amounts)
//! - Capitalized Chinese amount conversion
//! - A tiered PDF/image conversion pipeline for vision models
//! - The model-client seam used by language and vision model strategies

pub mod convert;
pub mod document;
pub mod error;
pub mod invoice;
pub mod models;
pub mod pdf;

pub use convert::{
    Conversion, DocumentConverter, DocumentKind, EncodedImage, UnitKind, convert_document,
};
pub use document::{DocumentPipeline, UploadedDocument};
pub use error::{ConversionError, DocumentError, ExtractionError, FapiaoError, ModelError, PdfError, Result};
pub use invoice::rules::numerals::{to_amount, to_decimal};
pub use invoice::{
    InvoiceExtractor, ModelClient, ModelExtractor, ModelInput, ModelRequest, RegexExtractor,
    Unconfigured,
};
pub use models::{ExtractedRecord, ExtractionMode, FapiaoConfig, InvoiceDate, ModelApi, ModelProfile};
pub use pdf::{Rasterizer, extract_pdf_text};
