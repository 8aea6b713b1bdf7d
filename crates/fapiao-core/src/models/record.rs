//! Extracted fapiao record.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Placeholder shown for fields that were not extracted.
pub const NOT_EXTRACTED: &str = "未提取";

/// Column labels of the display row, in order.
pub const DISPLAY_HEADERS: [&str; 11] = [
    "文件名",
    "发票号码",
    "开票日期",
    "购方名称",
    "销方名称",
    "项目名称",
    "金额",
    "税额",
    "价税合计",
    "原始文本",
    "错误信息",
];

/// Largest gap tolerated between `amount + tax` and `total`.
const CONSISTENCY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Issue date, normalized when the printed layout is recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvoiceDate {
    /// Parsed calendar date.
    Date(NaiveDate),
    /// Printed string in an unrecognized layout.
    Unparsed(String),
}

impl InvoiceDate {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            Self::Unparsed(_) => None,
        }
    }
}

impl fmt::Display for InvoiceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Unparsed(raw) => f.write_str(raw),
        }
    }
}

/// Structured fields recovered from one document.
///
/// A record built with [`ExtractedRecord::failed`] carries an `error_reason` and no fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Uploaded file name.
    pub source_name: String,

    /// 发票号码.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,

    /// 开票日期.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<InvoiceDate>,

    /// 购方名称.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_name: Option<String>,

    /// 销方名称.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_name: Option<String>,

    /// 项目名称.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,

    /// 金额, before tax.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,

    /// 税额.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<Decimal>,

    /// 价税合计.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Decimal>,

    /// Preview of the text (or model answer) the fields came from.
    #[serde(default)]
    pub raw_text: String,

    /// Why extraction failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl ExtractedRecord {
    /// Empty record for a source.
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            ..Self::default()
        }
    }

    /// Failure record: only the source name and the reason are set.
    pub fn failed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            error_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error_reason.is_some()
    }

    /// Set the source name.
    pub fn with_source(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = source_name.into();
        self
    }

    /// `false` only when all three amounts are present and `amount + tax` differs from
    /// `total` by more than 0.01.
    pub fn amounts_consistent(&self) -> bool {
        match (self.amount, self.tax_amount, self.total_amount) {
            (Some(amount), Some(tax), Some(total)) => {
                (amount + tax - total).abs() <= CONSISTENCY_TOLERANCE
            }
            _ => true,
        }
    }

    /// Names of the fields that were not extracted.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let present = [
            ("invoice_number", self.invoice_number.is_some()),
            ("issue_date", self.issue_date.is_some()),
            ("buyer_name", self.buyer_name.is_some()),
            ("seller_name", self.seller_name.is_some()),
            ("item_name", self.item_name.is_some()),
            ("amount", self.amount.is_some()),
            ("tax_amount", self.tax_amount.is_some()),
            ("total_amount", self.total_amount.is_some()),
        ];
        present
            .into_iter()
            .filter(|(_, is_present)| !is_present)
            .map(|(name, _)| name)
            .collect()
    }

    /// Display row matching [`DISPLAY_HEADERS`], with `未提取` for absent fields.
    pub fn display_row(&self) -> [String; 11] {
        fn shown<T: ToString>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map_or_else(|| NOT_EXTRACTED.to_string(), ToString::to_string)
        }

        [
            self.source_name.clone(),
            shown(&self.invoice_number),
            shown(&self.issue_date),
            shown(&self.buyer_name),
            shown(&self.seller_name),
            shown(&self.item_name),
            shown(&self.amount),
            shown(&self.tax_amount),
            shown(&self.total_amount),
            self.raw_text.clone(),
            self.error_reason.clone().unwrap_or_default(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn complete() -> ExtractedRecord {
        ExtractedRecord {
            source_name: "dining.pdf".to_string(),
            invoice_number: Some("25112000000130340249".to_string()),
            issue_date: Some(InvoiceDate::Date(NaiveDate::from_ymd_opt(2025, 6, 24).unwrap())),
            buyer_name: Some("北京星石娱动国际传媒有限公司".to_string()),
            seller_name: Some("北京那家雅居餐饮有限责任公司".to_string()),
            item_name: Some("*餐饮服务*餐费".to_string()),
            amount: Some(dec("652.83")),
            tax_amount: Some(dec("39.17")),
            total_amount: Some(dec("692.00")),
            raw_text: "电子发票".to_string(),
            error_reason: None,
        }
    }

    #[test]
    fn test_failed_record_has_no_fields() {
        let record = ExtractedRecord::failed("bad.pdf", "unsupported format");
        assert!(record.is_failed());
        assert_eq!(record.missing_fields().len(), 8);
        assert_eq!(record.raw_text, "");
    }

    #[test]
    fn test_amounts_consistency() {
        let mut record = complete();
        assert!(record.amounts_consistent());

        record.total_amount = Some(dec("692.01"));
        assert!(record.amounts_consistent());

        record.total_amount = Some(dec("700.00"));
        assert!(!record.amounts_consistent());

        record.tax_amount = None;
        assert!(record.amounts_consistent());
    }

    #[test]
    fn test_display_row() {
        let row = complete().display_row();
        assert_eq!(row[2], "2025-06-24");
        assert_eq!(row[8], "692.00");
        assert_eq!(row[10], "");

        let row = ExtractedRecord::failed("x.png", "boom").display_row();
        assert_eq!(row[1], NOT_EXTRACTED);
        assert_eq!(row[6], NOT_EXTRACTED);
        assert_eq!(row[10], "boom");
    }

    #[test]
    fn test_serialization_skips_absent_fields() {
        let json = serde_json::to_value(ExtractedRecord::new("a.pdf")).unwrap();
        assert_eq!(json, serde_json::json!({"source_name": "a.pdf", "raw_text": ""}));

        let json = serde_json::to_value(complete()).unwrap();
        assert_eq!(json["issue_date"], "2025-06-24");
    }

    #[test]
    fn test_unparsed_date_display() {
        let date = InvoiceDate::Unparsed("24.06.2025".to_string());
        assert_eq!(date.to_string(), "24.06.2025");
        assert_eq!(date.as_date(), None);
    }
}
