//! Text-layer extraction with pdf-extract.

use std::panic;

use lopdf::Document;
use tracing::{debug, warn};

use super::Result;
use crate::error::PdfError;

/// Source of per-page text for a PDF.
pub trait PageTextSource: Send + Sync {
    /// Text of every page, in page order. Pages without text are empty strings.
    fn page_texts(&self, pdf: &[u8]) -> Result<Vec<String>>;
}

/// pdf-extract backed page text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl PageTextSource for PdfTextExtractor {
    fn page_texts(&self, pdf: &[u8]) -> Result<Vec<String>> {
        let data = decrypted(pdf)?;

        // pdf-extract panics on some malformed content streams
        let pages = panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(&data))
            .map_err(|_| PdfError::TextExtraction("text extraction panicked".to_string()))?
            .map_err(|e| PdfError::TextExtraction(e.to_string()))?;

        debug!(pages = pages.len(), "extracted page text");
        Ok(pages)
    }
}

/// The document bytes, re-serialized without encryption when an empty password opens it.
fn decrypted(pdf: &[u8]) -> Result<Vec<u8>> {
    let mut doc = Document::load_mem(pdf).map_err(|e| PdfError::Parse(e.to_string()))?;
    if !doc.is_encrypted() {
        return Ok(pdf.to_vec());
    }

    doc.decrypt("").map_err(|_| PdfError::Encrypted)?;
    debug!("decrypted PDF with empty password");
    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {e}")))?;
    Ok(out)
}

/// All page texts joined with newlines, for the text-based extraction modes.
pub fn extract_pdf_text(pdf: &[u8]) -> Result<String> {
    let pages = PdfTextExtractor::new().page_texts(pdf)?;
    let text = pages
        .iter()
        .map(|page| page.trim())
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        warn!("PDF has no text layer");
    }
    Ok(text)
}
