//! Pattern-based invoice extraction.

use std::time::Instant;

use tracing::{debug, info};

use super::rules::{
    CompanyPairExtractor, DEFAULT_COMPANY_SUFFIXES, extract_amounts, extract_invoice_number,
    extract_issue_date, extract_item_name, normalize, preview,
};
use super::{InvoiceExtractor, Result};
use crate::error::{ExtractionError, FapiaoError};
use crate::models::config::ExtractionConfig;
use crate::models::record::ExtractedRecord;

/// Extracts every field with the rule set in [`super::rules`].
#[derive(Debug, Clone)]
pub struct RegexExtractor {
    companies: CompanyPairExtractor,
    preview_chars: usize,
}

impl RegexExtractor {
    /// Extractor with the default suffix list and a 500-character text preview.
    pub fn new() -> std::result::Result<Self, FapiaoError> {
        Self::from_config(&ExtractionConfig::default())
    }

    /// Extractor using the configured suffixes and preview length.
    pub fn from_config(config: &ExtractionConfig) -> std::result::Result<Self, FapiaoError> {
        let companies = if config.company_suffixes.is_empty() {
            CompanyPairExtractor::new(&DEFAULT_COMPANY_SUFFIXES)
        } else {
            CompanyPairExtractor::new(&config.company_suffixes)
        }
        .map_err(|e| FapiaoError::Config(format!("company suffixes: {e}")))?;

        Ok(Self {
            companies,
            preview_chars: config.raw_text_preview_chars,
        })
    }

    /// Set the number of characters kept in `raw_text`.
    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }
}

impl InvoiceExtractor for RegexExtractor {
    fn name(&self) -> &str {
        "regex"
    }

    fn extract(&self, text: &str) -> Result<ExtractedRecord> {
        let start = Instant::now();
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Err(ExtractionError::EmptyText);
        }

        info!("Extracting fields from {} characters of text", normalized.chars().count());

        let (buyer_name, seller_name) = self.companies.extract_pair(&normalized);
        let amounts = extract_amounts(&normalized);

        let record = ExtractedRecord {
            invoice_number: extract_invoice_number(&normalized),
            issue_date: extract_issue_date(&normalized),
            buyer_name,
            seller_name,
            item_name: extract_item_name(&normalized),
            amount: amounts.amount,
            tax_amount: amounts.tax,
            total_amount: amounts.total,
            raw_text: preview(&normalized, self.preview_chars),
            ..ExtractedRecord::default()
        };

        let missing = record.missing_fields();
        if !missing.is_empty() {
            debug!(?missing, "fields not found");
        }
        if !record.amounts_consistent() {
            debug!(
                amount = ?record.amount,
                tax = ?record.tax_amount,
                total = ?record.total_amount,
                "amount + tax does not match total"
            );
        }
        debug!(
            strategy = ?amounts.strategy,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "regex extraction done"
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::InvoiceDate;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    const DINING: &str = "电子发票（普通发票）
发票号码：25112000000130340249
开票日期：2025年06月24日
购 名称：北京星石娱动国际传媒有限公司 销 名称：北京那家雅居餐饮有限责任公司
买 统一社会信用代码/纳税人识别号：91110105MA01XXXXXX 售 统一社会信用代码/纳税人识别号：92110105MA01YYYYYY
方 方
信 信
息 息
项目名称 规格型号 单 位 数 量 单 价 金 额 税率/征收率 税 额
*餐饮服务*餐费 1652.8301886792453 652.83 6% 39.17
合 计 ¥652.83 ¥39.17
价税合计（大写） 陆佰玖拾贰圆整 （小写）¥692.00
开票人：胡晋阳";

    const RIDE_HAILING: &str = "电子发票（普通发票）
发票号码：25327000000693696263
开票日期：2025年06月23日
购买方信息 名称：北京星石娱动国际传媒有限公司
销售方信息 名称：苏州市吉利优行电子科技有限公司
*运输服务*客运服务费 129.757282 1 129.76 3% 3.89
*运输服务*客运服务费 -30.99 3% -0.93
价税合计（大写） 壹佰零壹圆柒角叁分 （小写）¥101.73";

    #[test]
    fn test_dining_invoice() {
        let record = RegexExtractor::new().unwrap().extract(DINING).unwrap();
        assert_eq!(record.invoice_number.as_deref(), Some("25112000000130340249"));
        assert_eq!(
            record.issue_date,
            Some(InvoiceDate::Date(NaiveDate::from_ymd_opt(2025, 6, 24).unwrap()))
        );
        assert_eq!(record.buyer_name.as_deref(), Some("北京星石娱动国际传媒有限公司"));
        assert_eq!(record.seller_name.as_deref(), Some("北京那家雅居餐饮有限责任公司"));
        assert_eq!(record.item_name.as_deref(), Some("*餐饮服务*餐费"));
        assert_eq!(record.amount, Some(dec("652.83")));
        assert_eq!(record.tax_amount, Some(dec("39.17")));
        assert_eq!(record.total_amount, Some(dec("692.00")));
        assert!(record.amounts_consistent());
        assert!(record.error_reason.is_none());
    }

    #[test]
    fn test_ride_hailing_invoice() {
        let record = RegexExtractor::new().unwrap().extract(RIDE_HAILING).unwrap();
        assert_eq!(record.invoice_number.as_deref(), Some("25327000000693696263"));
        assert_eq!(record.buyer_name.as_deref(), Some("北京星石娱动国际传媒有限公司"));
        assert_eq!(record.seller_name.as_deref(), Some("苏州市吉利优行电子科技有限公司"));
        assert_eq!(record.amount, Some(dec("98.77")));
        assert_eq!(record.tax_amount, Some(dec("2.96")));
        assert_eq!(record.total_amount, Some(dec("101.73")));
        assert!(record.amounts_consistent());
    }

    #[test]
    fn test_empty_text() {
        let extractor = RegexExtractor::new().unwrap();
        assert!(matches!(extractor.extract(" \n "), Err(ExtractionError::EmptyText)));

        let record = extractor.safe_extract("blank.pdf", "");
        assert!(record.is_failed());
        assert_eq!(record.source_name, "blank.pdf");
        assert_eq!(record.invoice_number, None);
    }

    #[test]
    fn test_safe_extract_sets_source() {
        let record = RegexExtractor::new().unwrap().safe_extract("dining.pdf", DINING);
        assert_eq!(record.source_name, "dining.pdf");
        assert!(!record.is_failed());
    }

    #[test]
    fn test_preview_length() {
        let long = format!("{DINING} {}", "备注".repeat(400));
        let record = RegexExtractor::new()
            .unwrap()
            .with_preview_chars(20)
            .extract(&long)
            .unwrap();
        assert_eq!(record.raw_text.chars().count(), 23);
        assert!(record.raw_text.ends_with("..."));
    }

    #[test]
    fn test_custom_suffixes() {
        let config = ExtractionConfig {
            company_suffixes: vec!["大学".to_string(), "医院".to_string()],
            ..ExtractionConfig::default()
        };
        let extractor = RegexExtractor::from_config(&config).unwrap();
        let record = extractor.extract("名称：甲大学 名称：乙医院 价税合计 ¥106.00").unwrap();
        assert_eq!(record.buyer_name.as_deref(), Some("甲大学"));
        assert_eq!(record.seller_name.as_deref(), Some("乙医院"));
        assert_eq!(record.total_amount, Some(dec("106.00")));
        assert_eq!(record.amount, Some(dec("100.00")));
    }
}
