use centim_core::Money;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::errors::ImportError;

/// Accepted date layouts, in trial order. The first layout producing a
/// valid calendar date wins, so `05/03/2024` reads as 5 March.
const DATE_FORMATS: [&str; 3] = ["%d/%m/%Y", "%Y-%m-%d", "%m/%d/%Y"];

/// Parse a statement amount. Exports mix decimal conventions (`10.50`,
/// `10,50`, `1,234.56`, `186.869,50`), so the last separator present is
/// taken as the decimal point and every earlier one as grouping.
/// Accounting-style parentheses mean negative.
pub fn parse_amount(raw: &str) -> Result<Money, ImportError> {
    let trimmed = raw.trim();
    let (negative, trimmed) = if trimmed.starts_with('(') && trimmed.ends_with(')') {
        (true, &trimmed[1..trimmed.len() - 1])
    } else {
        (false, trimmed)
    };

    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '€' | '$' | '£' | ' ' | '\u{a0}'))
        .collect();

    let normalized = match cleaned.rfind([',', '.']) {
        Some(idx) => {
            let mut s = String::with_capacity(cleaned.len());
            for (i, c) in cleaned.char_indices() {
                match c {
                    ',' | '.' if i == idx => s.push('.'),
                    ',' | '.' => {}
                    _ => s.push(c),
                }
            }
            s
        }
        None => cleaned,
    };

    let mut decimal =
        Decimal::from_str(&normalized).map_err(|_| ImportError::InvalidAmount(raw.to_string()))?;
    if negative {
        decimal = -decimal;
    }

    // The statement surface is untrusted; a syntactically valid amount can
    // still exceed what fits in i64 minor units downstream. Such a value is
    // no real bank figure, so the row is rejected here, not at persistence.
    if decimal.abs() > Decimal::from(i64::MAX / 100) {
        return Err(ImportError::InvalidAmount(raw.to_string()));
    }

    Ok(Money::from_decimal(decimal))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, ImportError> {
    let trimmed = raw.trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }

    Err(ImportError::InvalidDate(raw.to_string()))
}
