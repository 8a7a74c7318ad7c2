//! Reverse VAT calculation for gross bank amounts

use bigdecimal::rounding::RoundingMode;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// Net/VAT decomposition of a gross amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatBreakdown {
    /// Amount including VAT
    pub gross_amount: BigDecimal,
    /// Amount excluding VAT, rounded to cents
    pub net_amount: BigDecimal,
    /// VAT portion, the remainder after rounding the net
    pub vat_amount: BigDecimal,
    /// Rate applied, as a percentage
    pub rate: BigDecimal,
}

/// Split a gross (VAT-inclusive) amount into net and VAT at the given rate.
///
/// Net is `gross * 100 / (100 + rate)` rounded half-up to cents; VAT is
/// whatever remains, so net and VAT always re-add to the gross exactly.
pub fn breakdown_from_gross(gross_amount: &BigDecimal, rate: &BigDecimal) -> VatBreakdown {
    let divisor = BigDecimal::from(100) + rate;
    let net_amount =
        (gross_amount * BigDecimal::from(100) / divisor).with_scale_round(2, RoundingMode::HalfUp);
    let vat_amount = gross_amount - &net_amount;

    VatBreakdown {
        gross_amount: gross_amount.clone(),
        net_amount,
        vat_amount,
        rate: rate.clone(),
    }
}
