//! Capitalized Chinese amount (大写金额) conversion.
//!
//! Fapiao print the tax-inclusive total twice: once in digits and once in anti-tamper
//! capitalized numerals such as `壹万贰仟叁佰肆拾伍元整`. The converter reads the integer part
//! least-significant first so that the section units 万/亿 can close off the section
//! accumulated so far.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use super::patterns::CAPITAL_DIGIT;
use crate::error::ConversionError;

/// Currency and terminator tokens that carry no positional value.
const IGNORED_TOKENS: [&str; 6] = ["人民币", "RMB", "¥", "￥", "整", "正"];

const DECIMAL_POINT: char = '点';

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Digit(u32),
    /// Positional unit inside a section: 拾佰仟, the yuan marker and the 角/分 subunits.
    Unit(Decimal),
    /// Section unit: 万 or 亿.
    Section(Decimal),
}

fn token(c: char) -> Option<Token> {
    let t = match c {
        '零' => Token::Digit(0),
        '壹' => Token::Digit(1),
        '贰' => Token::Digit(2),
        '叁' => Token::Digit(3),
        '肆' => Token::Digit(4),
        '伍' => Token::Digit(5),
        '陆' => Token::Digit(6),
        '柒' => Token::Digit(7),
        '捌' => Token::Digit(8),
        '玖' => Token::Digit(9),
        '分' => Token::Unit(Decimal::new(1, 2)),
        '角' => Token::Unit(Decimal::new(1, 1)),
        '元' | '圆' => Token::Unit(Decimal::ONE),
        '拾' => Token::Unit(Decimal::TEN),
        '佰' => Token::Unit(Decimal::ONE_HUNDRED),
        '仟' => Token::Unit(Decimal::ONE_THOUSAND),
        '万' => Token::Section(Decimal::from(10_000)),
        '亿' => Token::Section(Decimal::from(100_000_000)),
        _ => return None,
    };
    Some(t)
}

/// Convert a capitalized numeral amount into a decimal.
///
/// Empty input yields zero. Input that still has characters after cleaning but none of them
/// is a digit or unit is a [`ConversionError`], as is a value too large for [`Decimal`].
pub fn to_decimal(numeral: &str) -> Result<Decimal, ConversionError> {
    let mut cleaned = numeral.trim().to_string();
    for ignored in IGNORED_TOKENS {
        cleaned = cleaned.replace(ignored, "");
    }
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let (integer_part, decimal_part) = match cleaned.split_once(DECIMAL_POINT) {
        Some((integer, decimal)) => (integer, decimal),
        None => (cleaned, ""),
    };

    let error = || ConversionError {
        input: numeral.to_string(),
    };
    let integer = integer_value(integer_part).map_err(|Overflow| error())?;
    let decimal = decimal_value(decimal_part);

    match (integer, decimal) {
        (None, None) => Err(error()),
        (integer, decimal) => integer
            .unwrap_or_default()
            .checked_add(decimal.unwrap_or_default())
            .ok_or_else(error),
    }
}

/// The integer segment does not fit in a [`Decimal`].
#[derive(Debug)]
struct Overflow;

fn add(a: Decimal, b: Decimal) -> Result<Decimal, Overflow> {
    a.checked_add(b).ok_or(Overflow)
}

fn mul(a: Decimal, b: Decimal) -> Result<Decimal, Overflow> {
    a.checked_mul(b).ok_or(Overflow)
}

/// Reverse scan of the integer segment. Returns `None` when no token was recognized.
fn integer_value(segment: &str) -> Result<Option<Decimal>, Overflow> {
    let mut running_total = Decimal::ZERO;
    let mut section_accumulator = Decimal::ZERO;
    let mut section_scale = Decimal::ONE;
    let mut unit_scale = Decimal::ONE;
    // 拾 with no digit in front of it reads as 壹拾
    let mut bare_ten = false;
    let mut recognized = false;

    for c in segment.chars().rev() {
        let Some(tok) = token(c) else { continue };
        recognized = true;

        if bare_ten && !matches!(tok, Token::Digit(_)) {
            section_accumulator = add(section_accumulator, unit_scale)?;
        }
        bare_ten = false;

        match tok {
            Token::Digit(d) => {
                let place = mul(Decimal::from(d), unit_scale)?;
                section_accumulator = add(section_accumulator, place)?;
            }
            Token::Unit(u) => {
                unit_scale = u;
                bare_ten = u == Decimal::TEN;
            }
            Token::Section(s) => {
                running_total = add(running_total, mul(section_accumulator, section_scale)?)?;
                section_accumulator = Decimal::ZERO;
                section_scale = if s > section_scale {
                    s
                } else {
                    // 万亿: the smaller unit compounds the section already open
                    mul(section_scale, s)?
                };
                unit_scale = Decimal::ONE;
            }
        }
    }

    if bare_ten {
        section_accumulator = add(section_accumulator, unit_scale)?;
    }
    running_total = add(running_total, mul(section_accumulator, section_scale)?)?;

    Ok(recognized.then_some(running_total))
}

/// Digits after 点, read left to right as tenths, hundredths, ...
///
/// Digits past the precision of [`Decimal`] are dropped.
fn decimal_value(segment: &str) -> Option<Decimal> {
    let mut value = Decimal::ZERO;
    let mut position = 0u32;

    for c in segment.chars() {
        if let Some(Token::Digit(d)) = token(c) {
            position += 1;
            if position <= Decimal::MAX_SCALE {
                value += Decimal::new(i64::from(d), position);
            }
        }
    }

    (position > 0).then_some(value)
}

/// Lenient amount conversion for values coming from models or loosely typed sources.
///
/// Numbers pass through. Strings are tried as a decimal literal, then as a capitalized
/// numeral if they contain a capitalized digit. Anything else is zero.
pub fn to_amount(value: &Value) -> Decimal {
    match value {
        Value::Number(n) => parse_literal(&n.to_string()).unwrap_or_default(),
        Value::String(s) => amount_from_str(s),
        _ => Decimal::ZERO,
    }
}

/// String form of [`to_amount`].
pub fn amount_from_str(s: &str) -> Decimal {
    let s = s.trim();
    if let Some(amount) = parse_literal(s) {
        return amount;
    }
    if CAPITAL_DIGIT.is_match(s) {
        if let Ok(amount) = to_decimal(s) {
            return amount;
        }
    }
    Decimal::ZERO
}

fn parse_literal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_yuan_jiao_fen() {
        assert_eq!(to_decimal("壹佰零壹圆柒角叁分").unwrap(), dec("101.73"));
        assert_eq!(to_decimal("陆拾叁元叁角").unwrap(), dec("63.3"));
        assert_eq!(to_decimal("伍角").unwrap(), dec("0.5"));
    }

    #[test]
    fn test_whole_amounts() {
        assert_eq!(to_decimal("陆佰玖拾贰圆整").unwrap(), dec("692.00"));
        assert_eq!(to_decimal("壹万贰仟叁佰肆拾伍元整").unwrap(), dec("12345"));
        assert_eq!(to_decimal("人民币壹仟元正").unwrap(), dec("1000"));
    }

    #[test]
    fn test_section_units() {
        assert_eq!(to_decimal("壹拾万元").unwrap(), dec("100000"));
        assert_eq!(to_decimal("壹万零伍元").unwrap(), dec("10005"));
        assert_eq!(to_decimal("壹亿贰仟万元").unwrap(), dec("120000000"));
        assert_eq!(to_decimal("叁万亿").unwrap(), dec("3000000000000"));
    }

    #[test]
    fn test_bare_ten() {
        assert_eq!(to_decimal("拾元").unwrap(), dec("10"));
        assert_eq!(to_decimal("拾伍元").unwrap(), dec("15"));
        assert_eq!(to_decimal("拾万元").unwrap(), dec("100000"));
    }

    #[test]
    fn test_decimal_point_segment() {
        assert_eq!(to_decimal("壹点伍").unwrap(), dec("1.5"));
        assert_eq!(to_decimal("贰拾点零叁").unwrap(), dec("20.03"));
    }

    #[test]
    fn test_empty_and_unrecognized() {
        assert_eq!(to_decimal("").unwrap(), Decimal::ZERO);
        assert_eq!(to_decimal("元整").unwrap(), Decimal::ZERO);
        assert!(to_decimal("未提取").is_err());
    }

    #[test]
    fn test_oversized_integer_is_an_error() {
        assert!(to_decimal("壹亿亿亿亿").is_err());
        assert!(to_decimal("玖拾万亿亿亿").is_err());
        assert_eq!(to_amount(&json!("壹亿亿亿亿")), Decimal::ZERO);
    }

    #[test]
    fn test_repeated_section_units() {
        assert_eq!(to_decimal("壹亿亿").unwrap(), dec("10000000000000000"));
        assert_eq!(to_decimal("伍万万").unwrap(), dec("500000000"));
    }

    #[test]
    fn test_deep_decimal_digits_are_truncated() {
        let numeral = format!("壹点{}", "壹".repeat(29));
        let value = to_decimal(&numeral).unwrap();
        assert_eq!(value.scale(), Decimal::MAX_SCALE);
        assert_eq!(value.trunc(), Decimal::ONE);
        assert_eq!(to_amount(&json!(numeral)), value);
    }

    #[test]
    fn test_to_amount() {
        assert_eq!(to_amount(&json!(98.77)), dec("98.77"));
        assert_eq!(to_amount(&json!(100)), dec("100"));
        assert_eq!(to_amount(&json!(" 101.73 ")), dec("101.73"));
        assert_eq!(to_amount(&json!("壹佰零壹圆柒角叁分")), dec("101.73"));
        assert_eq!(to_amount(&json!("¥101.73")), Decimal::ZERO);
        assert_eq!(to_amount(&json!("未提取")), Decimal::ZERO);
        assert_eq!(to_amount(&Value::Null), Decimal::ZERO);
        assert_eq!(to_amount(&json!(true)), Decimal::ZERO);
    }

    #[test]
    fn test_to_amount_idempotent() {
        for input in [json!("陆佰玖拾贰圆整"), json!("39.17"), json!(12.5), json!("abc")] {
            let once = to_amount(&input);
            let twice = to_amount(&json!(once.to_string()));
            assert_eq!(once, twice);
        }
    }
}
