//! Buyer/seller name extraction anchored on legal-entity suffixes.
//!
//! Fapiao print the buyer block before the seller block, so the first suffix-terminated
//! name is the buyer and the second is the seller. Role labels (`购 名称：`, `销 名称：`) are
//! consumed when present but never decide the role.

use regex::Regex;
use tracing::debug;

/// Suffixes used when the configuration does not supply any.
pub const DEFAULT_COMPANY_SUFFIXES: [&str; 7] = [
    "有限责任公司",
    "股份有限公司",
    "有限公司",
    "公司",
    "集团",
    "事务所",
    "研究院",
];

/// Compiled buyer/seller extractor for one suffix list.
#[derive(Debug, Clone)]
pub struct CompanyPairExtractor {
    pattern: Regex,
}

impl CompanyPairExtractor {
    /// Build the name pattern from a suffix list. Longer suffixes are tried first.
    pub fn new<S: AsRef<str>>(suffixes: &[S]) -> Result<Self, regex::Error> {
        let mut suffixes: Vec<&str> = suffixes
            .iter()
            .map(AsRef::as_ref)
            .filter(|s| !s.is_empty())
            .collect();
        if suffixes.is_empty() {
            suffixes = DEFAULT_COMPANY_SUFFIXES.to_vec();
        }
        suffixes.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        suffixes.dedup();

        let alternatives = suffixes
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(
            r"(?:(?:[购买销售]\s*)?名称\s*[:：]\s*)?([^\s：:]+?(?:{alternatives})[^)）\s]*)"
        );

        Ok(Self {
            pattern: Regex::new(&pattern)?,
        })
    }

    /// `(buyer, seller)`, both absent unless at least two names are found.
    pub fn extract_pair(&self, text: &str) -> (Option<String>, Option<String>) {
        let mut names = self
            .pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        match (names.next(), names.next()) {
            (Some(buyer), Some(seller)) => {
                debug!(%buyer, %seller, "company pair found");
                (Some(buyer), Some(seller))
            }
            _ => {
                debug!("fewer than two company names");
                (None, None)
            }
        }
    }
}

/// One-shot form of [`CompanyPairExtractor::extract_pair`].
///
/// A suffix list too large to compile yields no pair.
pub fn extract_pair<S: AsRef<str>>(text: &str, suffixes: &[S]) -> (Option<String>, Option<String>) {
    match CompanyPairExtractor::new(suffixes) {
        Ok(extractor) => extractor.extract_pair(text),
        Err(e) => {
            debug!(error = %e, "company pattern rejected");
            (None, None)
        }
    }
}
