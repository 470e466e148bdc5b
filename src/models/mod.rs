//! Data models for users, accounts, trades, and signals.

mod account;
mod signal;
mod trade;
mod user;

pub use account::Account;
pub use signal::Signal;
pub use trade::{Trade, TradeSide, TradeStatus, OUTCOME_LOSS, OUTCOME_NEUTRAL, OUTCOME_WIN};
pub use user::User;
