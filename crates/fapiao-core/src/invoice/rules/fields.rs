//! Invoice number and item name extraction.

use super::patterns::{INVOICE_NUMBER, INVOICE_NUMBER_LABELED, ITEM_NAME};
use super::{ExtractionMatch, FieldExtractor};

/// Invoice number (发票号码) extractor.
///
/// Fully digital fapiao carry a 20-digit number that is matched with or without its label.
/// Shorter legacy numbers are only accepted behind the `发票号码` label.
#[derive(Debug, Default)]
pub struct InvoiceNumberExtractor;

impl InvoiceNumberExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FieldExtractor for InvoiceNumberExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = INVOICE_NUMBER
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| {
                ExtractionMatch::new(m.as_str().to_string(), m.as_str())
                    .with_position(m.start(), m.end())
            })
            .collect();

        for m in INVOICE_NUMBER_LABELED
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
        {
            if results.iter().any(|r| r.value == m.as_str()) {
                continue;
            }
            results.push(
                ExtractionMatch::new(m.as_str().to_string(), m.as_str())
                    .with_position(m.start(), m.end()),
            );
        }

        results
    }
}

/// Item name (项目名称) extractor for the `*category*name` form.
#[derive(Debug, Default)]
pub struct ItemNameExtractor;

impl ItemNameExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FieldExtractor for ItemNameExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        ITEM_NAME
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| {
                ExtractionMatch::new(m.as_str().to_string(), m.as_str())
                    .with_position(m.start(), m.end())
            })
            .collect()
    }
}

/// First invoice number in the text.
pub fn extract_invoice_number(text: &str) -> Option<String> {
    InvoiceNumberExtractor::new().extract(text).map(|m| m.value)
}

/// First `*category*name` item in the text.
pub fn extract_item_name(text: &str) -> Option<String> {
    ItemNameExtractor::new().extract(text).map(|m| m.value)
}
