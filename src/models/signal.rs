//! Signal model: immutable audit record of a prediction-to-action decision.

use serde::{Deserialize, Serialize};

/// One recorded prediction decision. Never updated or deleted; several
/// signals per symbol and timestamp are expected (one per prediction run).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Signal {
    pub id: i64,

    pub user_id: i64,

    /// Pair symbol, normalized uppercase (e.g. "EURUSD")
    pub symbol: String,

    /// Timeframe label (e.g. "1h")
    pub timeframe: String,

    /// Decided action, normalized uppercase
    pub side: String,

    /// Confidence of the winning label (0..1)
    pub confidence: f64,

    /// Market price at decision time
    pub entry_price: f64,

    /// Stop distance used for sizing, in pips
    pub stop_pips: f64,

    pub created_at: String,
}
