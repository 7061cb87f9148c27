// 💰 Currency Parser / Formatter
// Localized amount text ⇄ Decimal, with an explicit separator convention

use crate::error::{DotacaoError, Result};
use num_format::{CustomFormat, Grouping, ToFormattedString};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Separator convention used to read and display amounts.
///
/// Defaults to the Brazilian convention: `1.234,56` shown as `R$ 1.234,56`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountFormat {
    pub thousands_separator: String,
    pub decimal_separator: String,
    pub currency_symbol: String,
}

impl Default for AmountFormat {
    fn default() -> Self {
        Self {
            thousands_separator: ".".to_string(),
            decimal_separator: ",".to_string(),
            currency_symbol: "R$".to_string(),
        }
    }
}

impl AmountFormat {
    pub fn validate(&self) -> Result<()> {
        if self.decimal_separator.is_empty() {
            return Err(DotacaoError::Config(
                "decimal_separator não pode ser vazio".to_string(),
            ));
        }
        if self.decimal_separator == self.thousands_separator {
            return Err(DotacaoError::Config(
                "decimal_separator e thousands_separator devem ser diferentes".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse user input such as `1.234,56` or `R$ 1.234,56`.
    pub fn parse(&self, text: &str) -> Result<Decimal> {
        parse_amount(text, self)
    }

    pub fn format(&self, amount: Decimal) -> String {
        format_amount(amount, self)
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Convert localized text into a decimal.
///
/// The currency symbol and whitespace are dropped, thousands separators are
/// removed and the decimal separator becomes `.`. What remains must be an
/// optionally signed run of digits with at most one decimal point.
pub fn parse_amount(text: &str, format: &AmountFormat) -> Result<Decimal> {
    let mut cleaned = text.trim().to_string();

    if !format.currency_symbol.is_empty() {
        cleaned = cleaned.replace(format.currency_symbol.as_str(), "");
    }
    cleaned.retain(|c| !c.is_whitespace());
    if !format.thousands_separator.is_empty() {
        cleaned = cleaned.replace(format.thousands_separator.as_str(), "");
    }
    let cleaned = cleaned.replace(format.decimal_separator.as_str(), ".");

    if !is_plain_number(&cleaned) {
        return Err(DotacaoError::InvalidAmount(text.to_string()));
    }

    Decimal::from_str(&cleaned).map_err(|_| DotacaoError::InvalidAmount(text.to_string()))
}

fn is_plain_number(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    let mut seen_point = false;
    let mut seen_digit = false;

    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_point => seen_point = true,
            _ => return false,
        }
    }

    seen_digit
}

// ============================================================================
// FORMATTING
// ============================================================================

/// Render an amount with symbol, grouping and two decimal places.
///
/// Falls back to `"{symbol} {raw}"` when the separators cannot be turned
/// into a grouping format.
pub fn format_amount(amount: Decimal, format: &AmountFormat) -> String {
    match grouped(amount, format) {
        Some(display) => display,
        None => {
            tracing::warn!(
                thousands = %format.thousands_separator,
                decimal = %format.decimal_separator,
                "grouping format unavailable, using plain currency display"
            );
            format!("{} {}", format.currency_symbol, amount)
        }
    }
}

fn grouped(amount: Decimal, format: &AmountFormat) -> Option<String> {
    let custom = CustomFormat::builder()
        .grouping(Grouping::Standard)
        .separator(&format.thousands_separator)
        .decimal(&format.decimal_separator)
        .build()
        .ok()?;

    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let magnitude = rounded.abs();
    let integer_part = magnitude.trunc().to_u128()?;
    let cents = (magnitude.fract() * Decimal::ONE_HUNDRED).to_u32()?;
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };

    Some(format!(
        "{}{} {}{}{:02}",
        sign,
        format.currency_symbol,
        integer_part.to_formatted_string(&custom),
        format.decimal_separator,
        cents
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brl() -> AmountFormat {
        AmountFormat::default()
    }

    #[test]
    fn test_parse_localized_amount() {
        assert_eq!(parse_amount("1.234,56", &brl()).unwrap(), Decimal::new(123456, 2));
        assert_eq!(parse_amount("1000", &brl()).unwrap(), Decimal::new(1000, 0));
        assert_eq!(parse_amount(" 0,5 ", &brl()).unwrap(), Decimal::new(5, 1));
        assert_eq!(parse_amount("1.000.000,00", &brl()).unwrap(), Decimal::new(1_000_000, 0));
    }

    #[test]
    fn test_parse_accepts_formatted_output() {
        assert_eq!(parse_amount("R$ 1.234,56", &brl()).unwrap(), Decimal::new(123456, 2));
        assert_eq!(parse_amount("-R$ 10,00", &brl()).unwrap(), Decimal::new(-10, 0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", "   ", "abc", "1,2,3", "12a", "1e3", "1_000", "-", ","] {
            let err = parse_amount(input, &brl()).unwrap_err();
            assert!(
                matches!(err, DotacaoError::InvalidAmount(_)),
                "expected InvalidAmount for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_format_with_grouping() {
        assert_eq!(format_amount(Decimal::new(123456, 2), &brl()), "R$ 1.234,56");
        assert_eq!(format_amount(Decimal::new(5, 1), &brl()), "R$ 0,50");
        assert_eq!(format_amount(Decimal::new(-1234567, 0), &brl()), "-R$ 1.234.567,00");
        assert_eq!(format_amount(Decimal::new(1005, 3), &brl()), "R$ 1,01");
    }

    #[test]
    fn test_parse_then_format() {
        let amount = parse_amount("1.234,56", &brl()).unwrap();
        assert_eq!(amount, Decimal::new(123456, 2));

        let display = format_amount(amount, &brl());
        assert!(display.starts_with("R$"));
        assert!(display.contains('.'));
        assert_eq!(display, "R$ 1.234,56");
    }

    #[test]
    fn test_round_trip_within_a_cent() {
        let tolerance = Decimal::new(1, 2);
        for input in ["0,01", "1", "999,999", "12.345,678", "1.000.000", "3,14159", "-42,5"] {
            let first = parse_amount(input, &brl()).unwrap();
            let again = parse_amount(&format_amount(first, &brl()), &brl()).unwrap();
            assert!(
                (first - again).abs() <= tolerance,
                "{} -> {} -> {}",
                input,
                first,
                again
            );
        }
    }

    #[test]
    fn test_us_convention() {
        let usd = AmountFormat {
            thousands_separator: ",".to_string(),
            decimal_separator: ".".to_string(),
            currency_symbol: "$".to_string(),
        };

        let amount = parse_amount("1,234.56", &usd).unwrap();
        assert_eq!(amount, Decimal::new(123456, 2));
        assert_eq!(format_amount(amount, &usd), "$ 1,234.56");
    }

    #[test]
    fn test_fallback_when_grouping_unavailable() {
        let odd = AmountFormat {
            thousands_separator: "<thousands>".to_string(),
            decimal_separator: ",".to_string(),
            currency_symbol: "R$".to_string(),
        };

        assert_eq!(format_amount(Decimal::new(123456, 2), &odd), "R$ 1234.56");
    }

    #[test]
    fn test_validate_rejects_ambiguous_separators() {
        let same = AmountFormat {
            thousands_separator: ",".to_string(),
            decimal_separator: ",".to_string(),
            currency_symbol: "R$".to_string(),
        };
        assert!(same.validate().is_err());
        assert!(brl().validate().is_ok());
    }
}
