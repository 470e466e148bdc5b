//! Trade model: one row per opened (or skipped) decision.

use serde::{Deserialize, Serialize};

/// Outcome score applied when a trade settles with a profit.
pub const OUTCOME_WIN: i64 = 10;
/// Outcome score applied when a trade settles with a loss.
pub const OUTCOME_LOSS: i64 = -5;
/// Outcome score when the trade settles exactly flat.
pub const OUTCOME_NEUTRAL: i64 = 0;

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    /// Parse a side string, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Some(TradeSide::Buy),
            "SELL" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

/// Lifecycle state of a trade.
///
/// OPEN transitions to CLOSED exactly once. SKIPPED is terminal and is
/// only ever written by the caller for decisions that never became a
/// position; the ledger itself never produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
    Skipped,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "OPEN",
            TradeStatus::Closed => "CLOSED",
            TradeStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OPEN" => Some(TradeStatus::Open),
            "CLOSED" => Some(TradeStatus::Closed),
            "SKIPPED" => Some(TradeStatus::Skipped),
            _ => None,
        }
    }
}

/// Persisted trade record.
///
/// Invariant: `closed_at` and `pnl` are both null or both set, and the
/// status is CLOSED exactly when both are set.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Trade {
    pub id: i64,

    pub user_id: i64,

    pub account_id: i64,

    pub symbol: String,

    /// "BUY" or "SELL", normalized uppercase
    pub side: String,

    /// "OPEN", "CLOSED", or "SKIPPED"
    pub status: String,

    pub entry_price: f64,

    pub stop_loss: f64,

    pub take_profit: Option<f64>,

    /// Position size in lots (> 0)
    pub lot_size: f64,

    /// Model confidence behind the decision (0..1)
    pub confidence: f64,

    /// Realized profit/loss, set once at close
    pub pnl: Option<f64>,

    /// +10 win, -5 loss, 0 neutral; set at close
    pub outcome_score: Option<i64>,

    /// Originating signal, when the trade came from the agent loop
    pub signal_id: Option<i64>,

    pub opened_at: String,

    pub closed_at: Option<String>,
}

impl Trade {
    pub fn side(&self) -> Option<TradeSide> {
        TradeSide::parse(&self.side)
    }

    pub fn status(&self) -> Option<TradeStatus> {
        TradeStatus::parse(&self.status)
    }

    pub fn is_open(&self) -> bool {
        self.status() == Some(TradeStatus::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!(TradeSide::parse("buy"), Some(TradeSide::Buy));
        assert_eq!(TradeSide::parse("SELL"), Some(TradeSide::Sell));
        assert_eq!(TradeSide::parse("Sell"), Some(TradeSide::Sell));
        assert_eq!(TradeSide::parse("hold"), None);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [TradeStatus::Open, TradeStatus::Closed, TradeStatus::Skipped] {
            assert_eq!(TradeStatus::parse(status.as_str()), Some(status));
        }
    }
}
