//! Invoice field extraction.
//!
//! Pattern-based and model-based strategies implement [`InvoiceExtractor`]; the caller picks
//! one from configuration.

pub mod model;
mod parser;
pub mod rules;

pub use model::{ModelClient, ModelExtractor, ModelInput, ModelRequest, Unconfigured};
pub use parser::RegexExtractor;

use tracing::warn;

use crate::error::ExtractionError;
use crate::models::record::ExtractedRecord;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// A strategy that turns invoice text into a record.
pub trait InvoiceExtractor: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &str;

    /// Extract fields from invoice text. The record's `source_name` is left empty.
    fn extract(&self, text: &str) -> Result<ExtractedRecord>;

    /// Like [`extract`](Self::extract), but failures become a failed record.
    fn safe_extract(&self, source_name: &str, text: &str) -> ExtractedRecord {
        match self.extract(text) {
            Ok(record) => record.with_source(source_name),
            Err(e) => {
                warn!(extractor = self.name(), source = source_name, error = %e, "extraction failed");
                ExtractedRecord::failed(source_name, e.to_string())
            }
        }
    }
}
