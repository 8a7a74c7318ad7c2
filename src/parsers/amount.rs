//! Locale-aware decimal amount parsing

use bigdecimal::BigDecimal;
use std::str::FromStr;

use crate::types::{ReconcileError, ReconcileResult};

/// Parse a raw amount string into a `BigDecimal`
///
/// Handles both European ("1.234,56") and US ("1,234.56") conventions. When
/// both separators appear, the right-most one is the decimal mark. With a
/// single separator, a group of exactly three trailing digits after a short
/// leading group reads as thousands grouping, anything else as a decimal
/// mark. Currency symbols and spaces are stripped; a parenthesized amount
/// is negative.
pub fn parse_amount(raw: &str) -> ReconcileResult<BigDecimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ReconcileError::Validation("Amount is empty".to_string()));
    }

    let parenthesized = trimmed.starts_with('(') && trimmed.ends_with(')');

    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-' | '+'))
        .collect();

    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };

    if digits.is_empty() || digits.contains('-') || digits.contains('+') {
        return Err(invalid(trimmed));
    }

    let normalized = normalize_separators(digits).ok_or_else(|| invalid(trimmed))?;
    let amount = BigDecimal::from_str(&normalized).map_err(|_| invalid(trimmed))?;

    if negative || parenthesized {
        Ok(-amount)
    } else {
        Ok(amount)
    }
}

fn invalid(raw: &str) -> ReconcileError {
    ReconcileError::Validation(format!("Invalid amount '{}'", raw))
}

fn normalize_separators(digits: &str) -> Option<String> {
    let last_comma = digits.rfind(',');
    let last_dot = digits.rfind('.');

    match (last_comma, last_dot) {
        (Some(comma), Some(dot)) => {
            if comma > dot {
                // European: dots group thousands, the comma is the decimal mark
                Some(digits.replace('.', "").replace(',', "."))
            } else {
                // US: commas group thousands, the dot is the decimal mark
                Some(digits.replace(',', ""))
            }
        }
        (Some(_), None) => single_separator(digits, ','),
        (None, Some(_)) => single_separator(digits, '.'),
        (None, None) => Some(digits.to_string()),
    }
}

fn single_separator(digits: &str, separator: char) -> Option<String> {
    let parts: Vec<&str> = digits.split(separator).collect();

    // ",45" style decimals without a leading zero
    if parts.len() == 2 && parts[0].is_empty() && !parts[1].is_empty() {
        return Some(format!("0.{}", parts[1]));
    }

    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }

    if parts.len() == 2 {
        let (head, tail) = (parts[0], parts[1]);
        if tail.len() == 3 && head.len() <= 3 && head != "0" {
            return Some(format!("{}{}", head, tail));
        }
        return Some(format!("{}.{}", head, tail));
    }

    // Several separators can only be thousands grouping
    if parts[1..].iter().all(|p| p.len() == 3) {
        return Some(parts.concat());
    }

    None
}
