//! Document-level processing: from uploaded bytes to an extracted record.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::convert::{DocumentConverter, DocumentKind, classify};
use crate::error::{ExtractionError, FapiaoError};
use crate::invoice::{InvoiceExtractor, ModelClient, ModelExtractor, RegexExtractor};
use crate::models::config::{ExtractionMode, FapiaoConfig, ModelProfile};
use crate::models::record::ExtractedRecord;
use crate::pdf::extract_pdf_text;

/// An uploaded file.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    /// File name shown on the record.
    pub name: String,
    /// File contents.
    pub bytes: Vec<u8>,
    /// Media type declared by the uploader, if any.
    pub declared_type: Option<String>,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            declared_type: None,
        }
    }

    pub fn with_declared_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }

    /// Read a file, declaring its media type from the extension when known.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let declared_type = DocumentKind::from_extension(path).map(|kind| kind.mime().to_string());
        Ok(Self {
            name,
            bytes,
            declared_type,
        })
    }
}

/// Runs one extraction mode over uploaded documents.
///
/// Holds no per-document state, so one pipeline can serve concurrent documents.
pub struct DocumentPipeline<C> {
    mode: ExtractionMode,
    regex: RegexExtractor,
    model: ModelExtractor<C>,
    converter: DocumentConverter,
}

impl<C: ModelClient> DocumentPipeline<C> {
    /// Pipeline for the configured mode, calling models through `client` with `profile`.
    pub fn new(config: &FapiaoConfig, client: C, profile: &ModelProfile) -> Result<Self, FapiaoError> {
        let preview_chars = config.extraction.raw_text_preview_chars;
        Ok(Self {
            mode: config.extraction.mode,
            regex: RegexExtractor::from_config(&config.extraction)?,
            model: ModelExtractor::new(client, profile).with_preview_chars(preview_chars),
            converter: DocumentConverter::new(config.conversion.clone()),
        })
    }

    /// Override the extraction mode.
    pub fn with_mode(mut self, mode: ExtractionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replace the document converter.
    pub fn with_converter(mut self, converter: DocumentConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Process an uploaded document. Never fails: errors become a failed record.
    pub fn process(&self, document: &UploadedDocument) -> ExtractedRecord {
        self.process_document(&document.name, &document.bytes, document.declared_type.as_deref())
    }

    /// Process raw bytes. Never fails: errors become a failed record.
    pub fn process_document(
        &self,
        name: &str,
        bytes: &[u8],
        declared_type: Option<&str>,
    ) -> ExtractedRecord {
        match self.try_process(bytes, declared_type) {
            Ok(record) => {
                info!(
                    document = name,
                    mode = %self.mode,
                    missing = record.missing_fields().len(),
                    "document processed"
                );
                record.with_source(name)
            }
            Err(e) => {
                warn!(document = name, mode = %self.mode, error = %e, "document failed");
                ExtractedRecord::failed(name, e.to_string())
            }
        }
    }

    fn try_process(
        &self,
        bytes: &[u8],
        declared_type: Option<&str>,
    ) -> Result<ExtractedRecord, FapiaoError> {
        let record = match self.mode {
            ExtractionMode::Regex => self.regex.extract(&self.pdf_text(bytes, declared_type)?)?,
            ExtractionMode::Llm => self.model.extract(&self.pdf_text(bytes, declared_type)?)?,
            ExtractionMode::Vlm => {
                let conversion = self.converter.convert(bytes, declared_type)?;
                for attempt in conversion.trail() {
                    debug!(
                        tier = %attempt.tier,
                        succeeded = attempt.succeeded,
                        message = %attempt.message,
                        "conversion attempt"
                    );
                }
                debug!(kind = %conversion.kind(), units = conversion.len(), "converted");
                self.model.extract_conversion(&conversion)?
            }
        };
        Ok(record)
    }

    /// Text layer of a PDF upload, for the text-based modes.
    fn pdf_text(&self, bytes: &[u8], declared_type: Option<&str>) -> Result<String, FapiaoError> {
        match classify(bytes, declared_type)? {
            DocumentKind::Pdf => Ok(extract_pdf_text(bytes)?),
            other => Err(ExtractionError::UnsupportedInput(format!(
                "{other} input requires vlm mode"
            ))
            .into()),
        }
    }
}
