//! Pip size and pip value conversion for currency pairs.

/// Smallest standard price increment for a pair: 0.01 for JPY-quoted
/// pairs, 0.0001 for everything else. The quote currency is inferred
/// from the symbol suffix.
pub fn pip_size(symbol: &str) -> f64 {
    if is_jpy_quoted(symbol) {
        0.01
    } else {
        0.0001
    }
}

/// Approximate pip value in USD for one standard lot (100,000 units).
///
/// USD-quoted majors are treated as a flat $10 per pip; the true value
/// drifts slightly with the cross rate and that drift is deliberately
/// ignored. JPY pairs convert through the current price so the value
/// stays USD-denominated. Non-USD crosses fall back to the same $10
/// approximation.
///
/// Returns 0.0 for a JPY pair with a non-positive price, meaning the
/// pair cannot be priced right now; callers must fall back to a minimum
/// lot size rather than treat 0.0 as a valid multiplier.
pub fn pip_value_per_lot(symbol: &str, price: f64) -> f64 {
    if is_jpy_quoted(symbol) {
        if price > 0.0 {
            100_000.0 * 0.01 / price
        } else {
            0.0
        }
    } else {
        10.0
    }
}

fn is_jpy_quoted(symbol: &str) -> bool {
    symbol.to_uppercase().ends_with("JPY")
}
