//! Validation and normalization utilities

use crate::types::*;
use bigdecimal::BigDecimal;

/// Normalize an IBAN: strip whitespace and uppercase
pub fn normalize_iban(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Normalize a BIC: strip whitespace and uppercase
pub fn normalize_bic(raw: &str) -> String {
    normalize_iban(raw)
}

/// One cent, the tolerance for split sums and amount comparisons
pub fn one_cent() -> BigDecimal {
    BigDecimal::from(1) / BigDecimal::from(100)
}

/// Validate that a split set covers the transaction amount
///
/// The split amounts must sum to the transaction amount within one cent.
pub fn validate_splits(
    transaction_amount: &BigDecimal,
    splits: &[SplitInput],
) -> ReconcileResult<()> {
    if splits.is_empty() {
        return Err(ReconcileError::Validation(
            "Split requires at least one part".to_string(),
        ));
    }

    let total: BigDecimal = splits.iter().map(|s| &s.amount).sum();
    if (&total - transaction_amount).abs() > one_cent() {
        return Err(ReconcileError::Validation(format!(
            "Split amounts sum to {} but the transaction amount is {}",
            total, transaction_amount
        )));
    }

    Ok(())
}
