//! Core trade/risk engine: pip metrics, position sizing, decision
//! mapping, and the trade lifecycle ledger.

mod config;
mod decision;
mod ledger;
mod pips;
mod position_sizer;

pub use config::RiskConfig;
pub use decision::{calculate_tp_sl, decide_action, PredictedAction};
pub use ledger::{LedgerError, OpenTrade, TradeLedger};
pub use pips::{pip_size, pip_value_per_lot};
pub use position_sizer::{size_position, LotConstraints};
