//! Tiered PDF conversion.
//!
//! ```text
//! primary ──structural──▶ repair + primary retry ──fail──▶ text fallback
//!    │
//!    └──unavailable / page count / out of memory──▶ secondary ──fail──▶ text fallback
//! ```

use std::io::Cursor;

use image::{ImageReader, Limits};
use tracing::{debug, info, warn};

use super::{Conversion, DocumentKind, EncodedImage, Tier, TierAttempt, classify};
use crate::error::DocumentError;
use crate::models::config::ConversionConfig;
use crate::pdf::{
    FailureClass, MutoolRasterizer, PageTextSource, PdfTextExtractor, PopplerRasterizer,
    Rasterizer, RenderFailure, RenderOptions, repair_pdf,
};

/// Converts uploads into images or text pages.
pub struct DocumentConverter {
    primary: Box<dyn Rasterizer>,
    secondary: Box<dyn Rasterizer>,
    text: Box<dyn PageTextSource>,
    config: ConversionConfig,
}

impl DocumentConverter {
    /// Converter with the MuPDF and poppler backends named in `config`.
    pub fn new(config: ConversionConfig) -> Self {
        Self {
            primary: Box::new(MutoolRasterizer::new(config.primary_command.clone())),
            secondary: Box::new(PopplerRasterizer::new(config.secondary_command.clone())),
            text: Box::new(PdfTextExtractor::new()),
            config,
        }
    }

    /// Replace the primary rasterizer.
    pub fn with_primary(mut self, rasterizer: impl Rasterizer + 'static) -> Self {
        self.primary = Box::new(rasterizer);
        self
    }

    /// Replace the secondary rasterizer.
    pub fn with_secondary(mut self, rasterizer: impl Rasterizer + 'static) -> Self {
        self.secondary = Box::new(rasterizer);
        self
    }

    /// Replace the page-text source used by the last tier.
    pub fn with_text_source(mut self, source: impl PageTextSource + 'static) -> Self {
        self.text = Box::new(source);
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Classify and convert an upload.
    pub fn convert(
        &self,
        bytes: &[u8],
        declared_type: Option<&str>,
    ) -> Result<Conversion, DocumentError> {
        let kind = classify(bytes, declared_type)?;
        debug!(%kind, bytes = bytes.len(), "classified document");

        match kind {
            DocumentKind::Pdf => self.convert_pdf(bytes),
            image_kind => self.convert_image(bytes, image_kind),
        }
    }

    /// Validate an image upload and wrap it as a single unit.
    fn convert_image(&self, bytes: &[u8], kind: DocumentKind) -> Result<Conversion, DocumentError> {
        let encoding = kind
            .image_encoding()
            .ok_or_else(|| DocumentError::UnsupportedFormat(kind.to_string()))?;

        let mut limits = Limits::default();
        limits.max_alloc = Some(self.config.max_image_bytes);
        let mut reader = ImageReader::with_format(Cursor::new(bytes), encoding.format());
        reader.limits(limits);
        let decoded = reader
            .decode()
            .map_err(|e| DocumentError::InvalidImage(e.to_string()))?;

        let image = EncodedImage {
            data: bytes.to_vec(),
            encoding,
            width: decoded.width(),
            height: decoded.height(),
        };
        debug!(width = image.width, height = image.height, %kind, "image upload accepted");

        Conversion::from_images(vec![image], Vec::new())
            .ok_or_else(|| DocumentError::InvalidImage("empty image".to_string()))
    }

    fn convert_pdf(&self, pdf: &[u8]) -> Result<Conversion, DocumentError> {
        let primary_options = RenderOptions {
            dpi: self.config.primary_dpi,
            max_pages: self.config.max_pages,
            max_image_bytes: self.config.max_image_bytes,
        };
        let secondary_options = RenderOptions {
            dpi: self.config.secondary_dpi,
            max_pages: self.config.secondary_cap(),
            max_image_bytes: self.config.max_image_bytes,
        };

        let mut trail: Vec<TierAttempt> = Vec::new();
        let mut tier = Tier::Primary;

        loop {
            let next = match tier {
                Tier::Primary => {
                    match render(self.primary.as_ref(), pdf, &primary_options) {
                        Ok(images) => return finish_images(images, tier, trail),
                        Err(failure) => {
                            let next = if failure.class.is_structural() {
                                Tier::Repair
                            } else {
                                Tier::Secondary
                            };
                            record_failure(&mut trail, tier, &failure.to_string());
                            next
                        }
                    }
                }

                Tier::Repair => {
                    match repair_pdf(pdf) {
                        Ok(repaired) => {
                            match render(self.primary.as_ref(), &repaired, &primary_options) {
                                Ok(images) => {
                                    return finish_images(images, tier, trail);
                                }
                                Err(failure) => {
                                    record_failure(
                                        &mut trail,
                                        tier,
                                        &format!("retry after repair: {failure}"),
                                    );
                                }
                            }
                        }
                        Err(e) => record_failure(&mut trail, tier, &e.to_string()),
                    }
                    Tier::TextFallback
                }

                Tier::Secondary => {
                    match render(self.secondary.as_ref(), pdf, &secondary_options) {
                        Ok(images) => return finish_images(images, tier, trail),
                        Err(failure) => {
                            record_failure(&mut trail, tier, &failure.to_string());
                        }
                    }
                    Tier::TextFallback
                }

                Tier::TextFallback => return self.text_fallback(pdf, trail),
            };
            tier = next;
        }
    }

    /// Last tier: non-empty page texts up to the page cap.
    fn text_fallback(
        &self,
        pdf: &[u8],
        mut trail: Vec<TierAttempt>,
    ) -> Result<Conversion, DocumentError> {
        let tier = Tier::TextFallback;

        let pages: Vec<String> = match self.text.page_texts(pdf) {
            Ok(pages) => pages
                .into_iter()
                .map(|page| page.trim().to_string())
                .filter(|page| !page.is_empty())
                .take(self.config.max_pages.max(1))
                .collect(),
            Err(e) => {
                record_failure(&mut trail, tier, &e.to_string());
                Vec::new()
            }
        };

        if pages.is_empty() {
            if trail.last().is_none_or(|attempt| attempt.tier != tier) {
                record_failure(&mut trail, tier, "no text layer");
            }
            let reason = trail
                .iter()
                .map(|attempt| format!("{}: {}", attempt.tier, attempt.message))
                .collect::<Vec<_>>()
                .join("; ");
            warn!(%reason, "all conversion tiers failed");
            return Err(DocumentError::RenderingFailure {
                attempts: trail.len(),
                reason,
            });
        }

        trail.push(TierAttempt {
            tier,
            succeeded: true,
            message: format!("{} text page(s)", pages.len()),
        });
        info!(pages = pages.len(), "degraded to text pages");
        Conversion::from_text_pages(pages, trail).ok_or_else(|| {
            DocumentError::RenderingFailure {
                attempts: 0,
                reason: "no text pages".to_string(),
            }
        })
    }
}

/// Convert an upload with the default backends and `config`.
pub fn convert_document(
    bytes: &[u8],
    declared_type: Option<&str>,
    config: &ConversionConfig,
) -> Result<Conversion, DocumentError> {
    DocumentConverter::new(config.clone()).convert(bytes, declared_type)
}

/// Rasterize and treat an empty result as a page-count failure.
fn render(
    rasterizer: &dyn Rasterizer,
    pdf: &[u8],
    options: &RenderOptions,
) -> Result<Vec<EncodedImage>, RenderFailure> {
    debug!(
        backend = rasterizer.name(),
        dpi = options.dpi,
        max_pages = options.max_pages,
        "rasterizing"
    );
    let mut images = rasterizer.rasterize(pdf, options)?;
    images.truncate(options.max_pages.max(1));
    if images.is_empty() {
        return Err(RenderFailure::new(
            FailureClass::PageCount,
            format!("{} rendered no pages", rasterizer.name()),
        ));
    }
    Ok(images)
}

fn finish_images(
    images: Vec<EncodedImage>,
    tier: Tier,
    mut trail: Vec<TierAttempt>,
) -> Result<Conversion, DocumentError> {
    trail.push(TierAttempt {
        tier,
        succeeded: true,
        message: format!("{} page(s)", images.len()),
    });
    info!(%tier, pages = images.len(), "rendered PDF");
    let attempts = trail.len();
    Conversion::from_images(images, trail).ok_or_else(|| DocumentError::RenderingFailure {
        attempts,
        reason: "no pages rendered".to_string(),
    })
}

fn record_failure(trail: &mut Vec<TierAttempt>, tier: Tier, message: &str) {
    debug!(%tier, %message, "conversion tier failed");
    trail.push(TierAttempt {
        tier,
        succeeded: false,
        message: message.to_string(),
    });
}
