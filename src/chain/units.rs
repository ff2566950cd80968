//! Conversions between raw on-chain amounts and human units.
//!
//! Threshold checks happen on raw `U256` values so the boundary is exact; the
//! `f64` forms are for reporting only.

use alloy::primitives::U256;

/// Scale factor `10^decimals`.
pub fn scale(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Convert a human amount into raw smallest units.
///
/// Fractions below one raw unit round up, so a threshold never becomes
/// easier to reach after conversion. Non-finite or overflowing values map to
/// `U256::MAX` (unreachable); negative values map to zero.
pub fn to_raw_units(amount: f64, decimals: u8) -> U256 {
    if !amount.is_finite() {
        return U256::MAX;
    }
    if amount <= 0.0 {
        return U256::ZERO;
    }

    // f64 Display never uses exponent notation.
    let text = amount.to_string();
    let (whole, fraction) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text.as_str(), ""),
    };

    let Ok(whole) = whole.parse::<U256>() else {
        return U256::MAX;
    };

    let digits = decimals as usize;
    let kept: String = fraction.chars().take(digits).collect();
    let dropped_nonzero = fraction.chars().skip(digits).any(|c| c != '0');
    let padded = format!("{:0<width$}", kept, width = digits);
    let fraction = if padded.is_empty() {
        U256::ZERO
    } else {
        padded.parse::<U256>().unwrap_or(U256::ZERO)
    };

    let raw = whole
        .checked_mul(scale(decimals))
        .and_then(|w| w.checked_add(fraction))
        .and_then(|r| if dropped_nonzero { r.checked_add(U256::from(1u8)) } else { Some(r) });

    raw.unwrap_or(U256::MAX)
}

/// Exact decimal string of a raw amount, trailing zeros trimmed.
pub fn format_units_exact(raw: U256, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let (whole, fraction) = raw.div_rem(scale(decimals));
    let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Lossy human amount for display and logging.
pub fn to_display_amount(raw: U256, decimals: u8) -> f64 {
    format_units_exact(raw, decimals).parse().unwrap_or(f64::MAX)
}

/// Compact rendering with K/M suffixes for log lines.
pub fn format_amount(amount: f64) -> String {
    if amount >= 1_000_000.0 {
        format!("{:.2}M", amount / 1_000_000.0)
    } else if amount >= 1_000.0 {
        format!("{:.2}K", amount / 1_000.0)
    } else if amount >= 1.0 {
        format!("{:.2}", amount)
    } else {
        format!("{:.6}", amount)
    }
}
