//! Trading account model.

use serde::{Deserialize, Serialize};

/// A simulated trading account owned by a user.
///
/// Balance is a signed amount and may go negative; it is mutated only
/// through trade settlement or an explicit balance update.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,

    pub user_id: i64,

    pub name: String,

    /// Current balance in account currency (USD)
    pub balance: f64,

    /// Fraction of balance risked per trade (0 < r <= 1)
    pub base_risk_pct: f64,

    /// Informational only; margin is not enforced
    pub leverage: i64,

    /// At most one default account per user
    pub is_default: bool,

    pub created_at: String,
}
