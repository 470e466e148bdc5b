//! Risk configuration.

use serde::{Deserialize, Serialize};

use super::position_sizer::LotConstraints;

/// Risk parameters for signal-driven trade entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Stop distance in pips for new trades
    pub stop_loss_pips: f64,

    /// Take-profit distance as a multiple of the stop distance
    pub risk_reward_ratio: f64,

    /// Smallest tradable lot
    pub min_lot: f64,

    /// Lot granularity
    pub lot_step: f64,

    /// Optional cap on position size
    pub max_lot: Option<f64>,

    /// Risk fraction used when an account has none configured
    pub fallback_risk_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pips: 10.0,
            risk_reward_ratio: 2.0, // 2:1 reward to risk
            min_lot: 0.01,
            lot_step: 0.01,
            max_lot: None,
            fallback_risk_pct: 0.01, // risk 1% per trade
        }
    }
}

impl RiskConfig {
    /// Lot constraints for the position sizer.
    pub fn lot_constraints(&self) -> LotConstraints {
        LotConstraints {
            min_lot: self.min_lot,
            lot_step: self.lot_step,
            max_lot: self.max_lot,
        }
    }
}
