//! Rule-based field extractors for Chinese fapiao.

pub mod amounts;
pub mod companies;
pub mod dates;
pub mod fields;
pub mod numerals;
pub mod patterns;
pub mod text;

pub use amounts::{extract_amounts, AmountStrategy, InvoiceAmounts};
pub use companies::{extract_pair, CompanyPairExtractor, DEFAULT_COMPANY_SUFFIXES};
pub use dates::{extract_issue_date, parse_date, DateExtractor};
pub use fields::{extract_invoice_number, extract_item_name, InvoiceNumberExtractor, ItemNameExtractor};
pub use numerals::{to_amount, to_decimal};
pub use text::{normalize, preview};

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// An extracted value with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Byte span in the source text.
    pub position: Option<(usize, usize)>,
    /// Source text that was matched.
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, source: impl Into<String>) -> Self {
        Self {
            value,
            position: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }
}
