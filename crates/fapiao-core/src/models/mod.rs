//! Data models: extracted records and configuration.

pub mod config;
pub mod record;

pub use config::{
    ConversionConfig, ExtractionConfig, ExtractionMode, FapiaoConfig, ModelApi, ModelProfile,
    ModelRegistry,
};
pub use record::{ExtractedRecord, InvoiceDate};
