//! Money helpers shared by both providers

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::error::{AppError, AppResult};

pub const MAX_INSTALLMENTS: u32 = 12;

/// Commission (percent) passed on to the customer per installment count,
/// index 0 unused.
const INSTALLMENT_RATES: [&str; 13] = [
    "0", "0", "2.99", "5.01", "7.10", "9.29", "11.57", "13.95", "16.43", "19.02", "21.73",
    "24.56", "27.53",
];

/// The amount to charge: an explicit positive total wins over the order total
pub fn resolve_charge_amount(explicit_total: Option<Decimal>, grand_total: Decimal) -> Decimal {
    match explicit_total {
        Some(total) if total > Decimal::ZERO => total,
        _ => grand_total,
    }
}

/// Integer minor units (kuruş), rounded half away from zero
pub fn to_minor_units(amount: Decimal) -> AppResult<i64> {
    let scaled = (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    if scaled < Decimal::ZERO {
        return Err(AppError::validation(format!(
            "Payment amount must not be negative: {}",
            amount
        )));
    }

    scaled
        .to_i64()
        .ok_or_else(|| AppError::validation(format!("Payment amount out of range: {}", amount)))
}

/// Installment count as the bank signs and submits it: empty for a single
/// payment, the plain integer otherwise
pub fn installment_field(count: Option<u32>) -> String {
    match count {
        Some(count) if count > 1 => count.to_string(),
        _ => String::new(),
    }
}

/// Two-decimal rendering used in the PayTR basket (`"18.00"`)
pub fn format_price(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

pub fn installment_rate(count: u32) -> Option<Decimal> {
    INSTALLMENT_RATES
        .get(count as usize)
        .filter(|_| count >= 1)
        .and_then(|rate| rate.parse().ok())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentOption {
    pub count: u32,
    pub rate_percent: Decimal,
    pub total_amount: Decimal,
    pub monthly_amount: Decimal,
}

/// Totals including commission for every supported installment count
pub fn installment_options(grand_total: Decimal) -> Vec<InstallmentOption> {
    (1..=MAX_INSTALLMENTS)
        .filter_map(|count| {
            let rate = installment_rate(count)?;
            let total = (grand_total * (Decimal::ONE + rate / Decimal::ONE_HUNDRED))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            let monthly = (total / Decimal::from(count))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            Some(InstallmentOption {
                count,
                rate_percent: rate,
                total_amount: total,
                monthly_amount: monthly,
            })
        })
        .collect()
}
