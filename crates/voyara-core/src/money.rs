use rust_decimal::{Decimal, RoundingStrategy};

pub fn minor_units(currency: &str) -> u32 {
    match currency.trim().to_ascii_uppercase().as_str() {
        "JPY" | "KRW" | "VND" | "CLP" | "ISK" | "UGX" | "XAF" | "XOF" => 0,
        "BHD" | "KWD" | "OMR" | "JOD" | "TND" => 3,
        _ => 2,
    }
}

pub fn round_to_minor_unit(amount: Decimal, currency: &str) -> Decimal {
    amount.round_dp_with_strategy(minor_units(currency), RoundingStrategy::MidpointAwayFromZero)
}

/// Largest amount a `NUMERIC(18, 4)` money column holds.
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999_999_999, 4)
}

/// `amount * percentage / 100`, rounded for `currency`. `None` on overflow.
pub fn percentage_of(amount: Decimal, percentage: Decimal, currency: &str) -> Option<Decimal> {
    let share = amount
        .checked_mul(percentage)?
        .checked_div(Decimal::ONE_HUNDRED)?;
    Some(round_to_minor_unit(share, currency))
}
