//! Common regex patterns for Chinese fapiao extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Whitespace, including the ideographic space U+3000
    pub static ref WHITESPACE_RUN: Regex = Regex::new(r"[\s\u{3000}]+").unwrap();

    // Invoice number: 20-digit fully digital fapiao number
    pub static ref INVOICE_NUMBER: Regex = Regex::new(
        r"(?:发票号码[:：])*\s*(\d{20})"
    ).unwrap();

    // Legacy paper fapiao numbers are shorter, so require the label
    pub static ref INVOICE_NUMBER_LABELED: Regex = Regex::new(
        r"发票号码\s*[:：]\s*(\d{8,20})"
    ).unwrap();

    // Issue date in 年月日 form
    pub static ref ISSUE_DATE: Regex = Regex::new(
        r"(?:开票日期[:：])*\s*(\d{4}年\d{1,2}月\d{1,2}日)"
    ).unwrap();

    pub static ref ISSUE_DATE_NUMERIC: Regex = Regex::new(
        r"开票日期\s*[:：]\s*(\d{4}[-/]\d{1,2}[-/]\d{1,2})"
    ).unwrap();

    // Item name: *category*name
    pub static ref ITEM_NAME: Regex = Regex::new(
        r"(\*[\u{4e00}-\u{9fa5}]+\*+[\u{4e00}-\u{9fa5}]+)"
    ).unwrap();

    // Subtotal marker followed by two currency-marked figures (amount, tax)
    pub static ref SUBTOTAL_PAIR: Regex = Regex::new(
        r"(?:合\s*计|价税合计).*?[^¥￥]*[¥￥]\s*(\d+\.\d{1,2}).*?[^¥￥]*[¥￥]\s*(\d+\.\d{1,2})"
    ).unwrap();

    // Tax-inclusive total qualified by (大写)/(小写)
    pub static ref TOTAL_QUALIFIED: Regex = Regex::new(
        r"价税合计\s*[(（]?[大小]写[)）]?[^¥￥]*[¥￥]\s*(\d+\.\d{1,2})"
    ).unwrap();

    pub static ref TOTAL_BARE: Regex = Regex::new(
        r"价税合计[^\d]*[^¥￥]*[¥￥]\s*(\d+\.\d{1,2})"
    ).unwrap();

    // Line item: *category*name [spec/unit words] [unit price] [quantity] amount rate% tax.
    // Price and quantity columns swap order between layouts, so up to two leading numbers
    // are skipped.
    pub static ref LINE_ITEM: Regex = Regex::new(
        r"\*[^*\s]+\*[^\s*]*(?:\s+[^\s\d*%¥￥.-][^\s*]*)*\s+(?:-?\d+(?:\.\d+)?\s+){0,2}(-?\d+(?:\.\d+)?)\s+\d+(?:\.\d+)?%\s+(-?\d+(?:\.\d+)?)"
    ).unwrap();

    // Single tax-inclusive total for reverse derivation
    pub static ref TOTAL_ANY: Regex = Regex::new(
        r"价税合计.*?[¥￥]\s*(\d+\.\d{2})"
    ).unwrap();

    // Capitalized Chinese digits
    pub static ref CAPITAL_DIGIT: Regex = Regex::new(
        r"[零壹贰叁肆伍陆柒捌玖]"
    ).unwrap();
}
