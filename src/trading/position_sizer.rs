//! Risk-based lot size computation.

use super::pips::pip_value_per_lot;

/// Broker lot constraints applied to every computed size.
#[derive(Debug, Clone)]
pub struct LotConstraints {
    /// Smallest tradable lot; also the safe fallback for degenerate input
    pub min_lot: f64,

    /// Lot granularity; raw sizes are quantized down to a multiple of this
    pub lot_step: f64,

    /// Optional hard cap on position size
    pub max_lot: Option<f64>,
}

impl Default for LotConstraints {
    fn default() -> Self {
        Self {
            min_lot: 0.01,
            lot_step: 0.01,
            max_lot: None,
        }
    }
}

/// Compute a risk-bounded lot size.
///
/// `risk_fraction` is the share of `balance` lost if the stop at
/// `stop_loss_pips` is hit. Raw size is quantized downward to a
/// `lot_step` multiple: rounding up could push the realized loss past
/// the nominal risk fraction. Any non-positive input, or an unpriceable
/// pair, resolves to `min_lot` rather than a zero or negative lot.
///
/// Pure function: same inputs, same output.
pub fn size_position(
    balance: f64,
    risk_fraction: f64,
    stop_loss_pips: f64,
    symbol: &str,
    price: f64,
    constraints: &LotConstraints,
) -> f64 {
    if balance <= 0.0 || risk_fraction <= 0.0 || stop_loss_pips <= 0.0 || price <= 0.0 {
        return constraints.min_lot;
    }

    let pip_value = pip_value_per_lot(symbol, price);
    if pip_value <= 0.0 {
        return constraints.min_lot;
    }

    let risk_amount = balance * risk_fraction;
    let raw_lots = risk_amount / (stop_loss_pips * pip_value);

    // Quantize down to the lot step. The epsilon keeps float division
    // that lands a hair below an exact multiple from dropping a step.
    let steps = (raw_lots / constraints.lot_step + 1e-9).floor();
    let mut lots = steps * constraints.lot_step;

    lots = lots.max(constraints.min_lot);
    if let Some(max_lot) = constraints.max_lot {
        lots = lots.min(max_lot);
    }

    round2(lots)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
