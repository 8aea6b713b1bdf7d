//! Issue date extraction for Chinese fapiao.

use chrono::NaiveDate;

use super::patterns::{ISSUE_DATE, ISSUE_DATE_NUMERIC};
use super::{ExtractionMatch, FieldExtractor};
use crate::models::record::InvoiceDate;

/// Accepted textual date layouts, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y年%m月%d日", "%Y-%m-%d", "%Y/%m/%d"];

/// Issue date extractor.
#[derive(Debug, Default)]
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<InvoiceDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();

        // 年月日 first, labelled or not
        for caps in ISSUE_DATE.captures_iter(text) {
            let raw = caps.get(1).map_or("", |m| m.as_str());
            let (start, end) = caps.get(0).map_or((0, 0), |m| (m.start(), m.end()));
            results.push(ExtractionMatch::new(parse_date(raw), raw).with_position(start, end));
        }

        // Dash or slash layouts only when labelled
        for caps in ISSUE_DATE_NUMERIC.captures_iter(text) {
            let raw = caps.get(1).map_or("", |m| m.as_str());
            let date = parse_date(raw);
            if results.iter().any(|r| r.value == date) {
                continue;
            }
            let (start, end) = caps.get(0).map_or((0, 0), |m| (m.start(), m.end()));
            results.push(ExtractionMatch::new(date, raw).with_position(start, end));
        }

        results
    }
}

/// Parse a date string in any accepted layout, keeping the raw string when none match.
pub fn parse_date(raw: &str) -> InvoiceDate {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .map_or_else(|| InvoiceDate::Unparsed(raw.to_string()), InvoiceDate::Date)
}

/// First issue date found in the text.
pub fn extract_issue_date(text: &str) -> Option<InvoiceDate> {
    DateExtractor::new().extract(text).map(|m| m.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> InvoiceDate {
        InvoiceDate::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_three_layouts_agree() {
        for raw in ["2025年06月24日", "2025-06-24", "2025/06/24"] {
            assert_eq!(parse_date(raw), date(2025, 6, 24), "layout {raw}");
        }
    }

    #[test]
    fn test_single_digit_month_and_day() {
        assert_eq!(parse_date("2025年6月4日"), date(2025, 6, 4));
    }

    #[test]
    fn test_unknown_layout_kept_verbatim() {
        assert_eq!(
            parse_date("24.06.2025"),
            InvoiceDate::Unparsed("24.06.2025".to_string())
        );
        assert_eq!(
            parse_date("2025年13月40日"),
            InvoiceDate::Unparsed("2025年13月40日".to_string())
        );
    }

    #[test]
    fn test_extract_labelled_date() {
        let text = "发票号码：25112000000130340249 开票日期：2025年06月24日";
        assert_eq!(extract_issue_date(text), Some(date(2025, 6, 24)));
    }

    #[test]
    fn test_extract_numeric_fallback() {
        let text = "开票日期: 2024/12/31 购买方";
        assert_eq!(extract_issue_date(text), Some(date(2024, 12, 31)));
        assert_eq!(extract_issue_date("日期 2024/12/31"), None);
    }

    #[test]
    fn test_match_position() {
        let found = DateExtractor::new().extract("开票日期：2025年06月24日").unwrap();
        assert_eq!(found.source, "2025年06月24日");
        assert!(found.position.is_some());
    }
}
