//! Amount, tax and tax-inclusive total extraction.
//!
//! Strategies run in a fixed order and the first usable one wins:
//!
//! 1. subtotal line (`合计 ¥amount ¥tax`) together with the tax-inclusive total
//! 2. sum of the item lines (`*category*name ... amount rate% tax`)
//! 3. derive amount and tax back from the tax-inclusive total
//!
//! Strategy 1 can bind to unrelated currency figures when a table sits between `合计` and
//! `价税合计` (travel passenger details, for instance). That risk is kept as-is.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use super::patterns::{
    LINE_ITEM, SUBTOTAL_PAIR, TOTAL_ANY, TOTAL_BARE, TOTAL_QUALIFIED, WHITESPACE_RUN,
};

/// Which strategy produced the amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountStrategy {
    /// Subtotal pair and tax-inclusive total were both printed.
    DualTotal,
    /// Summed from item lines.
    LineItems,
    /// Subtotal pair without a readable tax-inclusive total.
    SubtotalOnly,
    /// Back-calculated from the tax-inclusive total with an assumed rate.
    Derived,
}

/// Extracted amounts from an invoice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvoiceAmounts {
    /// Amount before tax (金额).
    pub amount: Option<Decimal>,
    /// Tax amount (税额).
    pub tax: Option<Decimal>,
    /// Tax-inclusive total (价税合计).
    pub total: Option<Decimal>,
    /// Strategy that produced the values, `None` when nothing matched.
    pub strategy: Option<AmountStrategy>,
}

impl InvoiceAmounts {
    fn new(
        amount: Decimal,
        tax: Decimal,
        total: Option<Decimal>,
        strategy: AmountStrategy,
    ) -> Self {
        Self {
            amount: Some(amount),
            tax: Some(tax),
            total,
            strategy: Some(strategy),
        }
    }

    /// Plain `(amount, tax, total)` triple.
    pub fn triple(&self) -> (Option<Decimal>, Option<Decimal>, Option<Decimal>) {
        (self.amount, self.tax, self.total)
    }
}

/// Extract amounts from invoice text.
pub fn extract_amounts(text: &str) -> InvoiceAmounts {
    let cleaned = WHITESPACE_RUN.replace_all(text.trim(), " ");

    let pair = subtotal_pair(&cleaned);
    let total = tax_inclusive_total(&cleaned);

    if let (Some((amount, tax)), Some(total)) = (pair, total) {
        debug!(%amount, %tax, %total, "amounts from subtotal and total lines");
        return InvoiceAmounts::new(amount, tax, Some(total), AmountStrategy::DualTotal);
    }

    if let Some((amount, tax)) = line_item_sums(&cleaned) {
        debug!(%amount, %tax, ?total, "amounts from item lines");
        return InvoiceAmounts::new(amount, tax, total, AmountStrategy::LineItems);
    }

    if let Some((amount, tax)) = pair {
        debug!(%amount, %tax, "subtotal found without tax-inclusive total");
        return InvoiceAmounts::new(amount, tax, None, AmountStrategy::SubtotalOnly);
    }

    if let Some((amount, tax, total)) = derive_from_total(&cleaned) {
        debug!(%amount, %tax, %total, "amounts derived from tax-inclusive total");
        return InvoiceAmounts::new(amount, tax, Some(total), AmountStrategy::Derived);
    }

    debug!("no amount strategy matched");
    InvoiceAmounts::default()
}

/// `合计 ¥amount ¥tax`.
pub fn subtotal_pair(text: &str) -> Option<(Decimal, Decimal)> {
    let caps = SUBTOTAL_PAIR.captures(text)?;
    let amount = Decimal::from_str(&caps[1]).ok()?;
    let tax = Decimal::from_str(&caps[2]).ok()?;
    Some((amount, tax))
}

/// Tax-inclusive total, preferring the `(大写)/(小写)` qualified marker over a bare `价税合计`.
pub fn tax_inclusive_total(text: &str) -> Option<Decimal> {
    TOTAL_QUALIFIED
        .captures(text)
        .or_else(|| TOTAL_BARE.captures(text))
        .and_then(|caps| Decimal::from_str(&caps[1]).ok())
}

/// Sum of line amounts and line taxes over every item line, `None` if no line matched.
pub fn line_item_sums(text: &str) -> Option<(Decimal, Decimal)> {
    let mut matched = 0usize;
    let mut amount = Decimal::ZERO;
    let mut tax = Decimal::ZERO;

    for caps in LINE_ITEM.captures_iter(text) {
        let (Ok(line_amount), Ok(line_tax)) =
            (Decimal::from_str(&caps[1]), Decimal::from_str(&caps[2]))
        else {
            continue;
        };
        amount += line_amount;
        tax += line_tax;
        matched += 1;
    }

    if matched == 0 {
        return None;
    }
    debug!(lines = matched, "summed item lines");
    Some((round_cents(amount), round_cents(tax)))
}

/// Back-calculate `(amount, tax, total)` from a lone tax-inclusive total.
///
/// The rate is 3% when the literal `3%` appears anywhere in the text and 6% otherwise.
pub fn derive_from_total(text: &str) -> Option<(Decimal, Decimal, Decimal)> {
    let caps = TOTAL_ANY.captures(text)?;
    let total = Decimal::from_str(&caps[1]).ok()?;

    let rate = if text.contains("3%") {
        Decimal::new(3, 2)
    } else {
        Decimal::new(6, 2)
    };
    let amount = round_cents(total / (Decimal::ONE + rate));
    let tax = round_cents(total - amount);
    Some((amount, tax, total))
}

/// Round half away from zero to two decimal places.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
