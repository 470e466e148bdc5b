//! Trade lifecycle: open, rule-triggered or manual close, PnL settlement.
//!
//! All state changes run inside a single transaction so a trade's close
//! and the owning account's balance update commit together or not at all.

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

use crate::db::Database;
use crate::models::{Trade, TradeSide, OUTCOME_LOSS, OUTCOME_NEUTRAL, OUTCOME_WIN};

use super::pips::{pip_size, pip_value_per_lot};

/// Errors callers must branch on when driving the trade lifecycle.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("trade {0} not found")]
    NotFound(i64),

    #[error("trade {id} is not open (status {status})")]
    NotOpen { id: i64, status: String },

    #[error("invalid trade parameters: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Parameters for opening a trade.
#[derive(Debug, Clone)]
pub struct OpenTrade {
    pub user_id: i64,
    pub account_id: i64,
    pub symbol: String,
    pub side: TradeSide,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub lot_size: f64,
    pub confidence: f64,
    /// Originating signal, when opened by the agent loop
    pub signal_id: Option<i64>,
}

/// State machine for trade records: OPEN -> CLOSED, settled exactly once.
pub struct TradeLedger {
    pool: SqlitePool,
}

impl TradeLedger {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Open a trade with status OPEN and return the persisted record.
    ///
    /// The account id is trusted here; callers must have verified that it
    /// belongs to the user. No cap on simultaneous open trades and no
    /// margin check against leverage.
    pub async fn open_trade(&self, params: OpenTrade) -> Result<Trade, LedgerError> {
        if params.lot_size <= 0.0 {
            return Err(LedgerError::InvalidInput(format!(
                "lot size must be positive, got {}",
                params.lot_size
            )));
        }
        if params.entry_price <= 0.0 {
            return Err(LedgerError::InvalidInput(format!(
                "entry price must be positive, got {}",
                params.entry_price
            )));
        }

        let trade: Trade = sqlx::query_as(
            r#"
            INSERT INTO trades (
                user_id, account_id, symbol, side, status, entry_price,
                stop_loss, take_profit, lot_size, confidence, signal_id, opened_at
            ) VALUES (?, ?, ?, ?, 'OPEN', ?, ?, ?, ?, ?, ?, datetime('now'))
            RETURNING *
            "#,
        )
        .bind(params.user_id)
        .bind(params.account_id)
        .bind(params.symbol.to_uppercase())
        .bind(params.side.as_str())
        .bind(params.entry_price)
        .bind(params.stop_loss)
        .bind(params.take_profit)
        .bind(params.lot_size)
        .bind(params.confidence)
        .bind(params.signal_id)
        .fetch_one(&self.pool)
        .await?;

        info!(
            trade_id = trade.id,
            symbol = %trade.symbol,
            side = %trade.side,
            lots = trade.lot_size,
            entry = trade.entry_price,
            "Opened trade"
        );

        Ok(trade)
    }

    /// Settle a trade against the supplied price.
    ///
    /// Exit price: take-profit if the price has crossed it, else stop-loss
    /// if crossed, else the supplied price itself. A manual close always
    /// exits at the supplied price. The trade must still be OPEN; settling
    /// is one-shot and a second close never re-applies PnL.
    pub async fn close_trade(
        &self,
        trade_id: i64,
        current_price: f64,
        manual: bool,
    ) -> Result<Trade, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let trade: Trade = sqlx::query_as("SELECT * FROM trades WHERE id = ?")
            .bind(trade_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LedgerError::NotFound(trade_id))?;

        if !trade.is_open() {
            return Err(LedgerError::NotOpen {
                id: trade_id,
                status: trade.status.clone(),
            });
        }

        let side = trade.side().ok_or_else(|| {
            LedgerError::InvalidInput(format!("trade {} has invalid side {}", trade_id, trade.side))
        })?;

        let exit_price = determine_exit_price(&trade, side, current_price, manual);

        let pip = pip_size(&trade.symbol);
        let pip_count = match side {
            TradeSide::Buy => (exit_price - trade.entry_price) / pip,
            TradeSide::Sell => (trade.entry_price - exit_price) / pip,
        };

        let pip_value = pip_value_per_lot(&trade.symbol, trade.entry_price);
        let pnl = round4(pip_count * pip_value * trade.lot_size);

        let outcome_score = if pnl > 0.0 {
            OUTCOME_WIN
        } else if pnl < 0.0 {
            OUTCOME_LOSS
        } else {
            OUTCOME_NEUTRAL
        };

        // The status guard serializes concurrent closers: whoever loses
        // the race updates zero rows and the settlement is not re-applied.
        let updated = sqlx::query(
            r#"
            UPDATE trades SET
                status = 'CLOSED',
                pnl = ?,
                outcome_score = ?,
                closed_at = datetime('now')
            WHERE id = ? AND status = 'OPEN'
            "#,
        )
        .bind(pnl)
        .bind(outcome_score)
        .bind(trade_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            return Err(LedgerError::NotOpen {
                id: trade_id,
                status: "CLOSED".to_string(),
            });
        }

        sqlx::query("UPDATE accounts SET balance = balance + ? WHERE id = ?")
            .bind(pnl)
            .bind(trade.account_id)
            .execute(&mut *tx)
            .await?;

        let settled: Trade = sqlx::query_as("SELECT * FROM trades WHERE id = ?")
            .bind(trade_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            trade_id = trade_id,
            exit = exit_price,
            pnl = pnl,
            outcome = outcome_score,
            "Closed trade"
        );

        Ok(settled)
    }
}

/// Pick the exit price for a close request. A take-profit or stop-loss
/// that the price has crossed wins over the raw price; manual closes
/// always use the price as given. A zero stop-loss counts as unset.
fn determine_exit_price(trade: &Trade, side: TradeSide, price: f64, manual: bool) -> f64 {
    if !manual {
        if let Some(tp) = trade.take_profit {
            let crossed = match side {
                TradeSide::Buy => price >= tp,
                TradeSide::Sell => price <= tp,
            };
            if crossed {
                return tp;
            }
        }

        if trade.stop_loss > 0.0 {
            let crossed = match side {
                TradeSide::Buy => price <= trade.stop_loss,
                TradeSide::Sell => price >= trade.stop_loss,
            };
            if crossed {
                return trade.stop_loss;
            }
        }
    }

    price
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeStatus;

    async fn setup() -> (Database, TradeLedger, i64, i64) {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let user = db.create_user("trader", None).await.unwrap();
        let account = db
            .create_account(user.id, "Main", 1000.0, 0.01, 100)
            .await
            .unwrap();
        let ledger = TradeLedger::new(&db);
        (db, ledger, user.id, account.id)
    }

    fn eurusd_buy(user_id: i64, account_id: i64) -> OpenTrade {
        OpenTrade {
            user_id,
            account_id,
            symbol: "EURUSD".to_string(),
            side: TradeSide::Buy,
            entry_price: 1.1,
            stop_loss: 1.099,
            take_profit: Some(1.102),
            lot_size: 1.0,
            confidence: 0.8,
            signal_id: None,
        }
    }

    #[tokio::test]
    async fn open_trade_starts_open_and_unsettled() {
        let (_db, ledger, user_id, account_id) = setup().await;

        let trade = ledger.open_trade(eurusd_buy(user_id, account_id)).await.unwrap();

        assert_eq!(trade.status(), Some(TradeStatus::Open));
        assert_eq!(trade.side(), Some(TradeSide::Buy));
        assert!(trade.pnl.is_none());
        assert!(trade.closed_at.is_none());
        assert!(trade.outcome_score.is_none());
    }

    #[tokio::test]
    async fn open_rejects_non_positive_lot() {
        let (_db, ledger, user_id, account_id) = setup().await;

        let mut params = eurusd_buy(user_id, account_id);
        params.lot_size = 0.0;

        assert!(matches!(
            ledger.open_trade(params).await,
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn buy_close_ten_pips_up_settles_plus_hundred() {
        let (db, ledger, user_id, account_id) = setup().await;

        let trade = ledger.open_trade(eurusd_buy(user_id, account_id)).await.unwrap();
        let closed = ledger.close_trade(trade.id, 1.101, true).await.unwrap();

        // 10 pips * $10/pip * 1.0 lot
        assert_eq!(closed.pnl, Some(100.0));
        assert_eq!(closed.outcome_score, Some(OUTCOME_WIN));
        assert_eq!(closed.status(), Some(TradeStatus::Closed));
        assert!(closed.closed_at.is_some());

        let account = db.get_account(user_id, account_id).await.unwrap().unwrap();
        assert_eq!(account.balance, 1100.0);
    }

    #[tokio::test]
    async fn second_close_is_rejected_and_balance_unchanged() {
        let (db, ledger, user_id, account_id) = setup().await;

        let trade = ledger.open_trade(eurusd_buy(user_id, account_id)).await.unwrap();
        ledger.close_trade(trade.id, 1.101, true).await.unwrap();

        let err = ledger.close_trade(trade.id, 1.2, true).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotOpen { .. }));

        let account = db.get_account(user_id, account_id).await.unwrap().unwrap();
        assert_eq!(account.balance, 1100.0);
    }

    #[tokio::test]
    async fn closing_unknown_trade_is_not_found() {
        let (_db, ledger, _user_id, _account_id) = setup().await;

        assert!(matches!(
            ledger.close_trade(9999, 1.1, true).await,
            Err(LedgerError::NotFound(9999))
        ));
    }

    #[tokio::test]
    async fn buy_take_profit_caps_the_exit() {
        let (_db, ledger, user_id, account_id) = setup().await;

        let trade = ledger.open_trade(eurusd_buy(user_id, account_id)).await.unwrap();
        // Price blew past the 1.1020 target; exit is still the target.
        let closed = ledger.close_trade(trade.id, 1.105, false).await.unwrap();

        // 20 pips * $10 * 1.0 lot
        assert_eq!(closed.pnl, Some(200.0));
        assert_eq!(closed.outcome_score, Some(OUTCOME_WIN));
    }

    #[tokio::test]
    async fn buy_stop_loss_floors_the_exit() {
        let (db, ledger, user_id, account_id) = setup().await;

        let trade = ledger.open_trade(eurusd_buy(user_id, account_id)).await.unwrap();
        let closed = ledger.close_trade(trade.id, 1.0985, false).await.unwrap();

        // Stopped at 1.0990: -10 pips * $10 * 1.0 lot
        assert_eq!(closed.pnl, Some(-100.0));
        assert_eq!(closed.outcome_score, Some(OUTCOME_LOSS));

        let account = db.get_account(user_id, account_id).await.unwrap().unwrap();
        assert_eq!(account.balance, 900.0);
    }

    #[tokio::test]
    async fn sell_thresholds_are_mirrored() {
        let (_db, ledger, user_id, account_id) = setup().await;

        let params = OpenTrade {
            side: TradeSide::Sell,
            stop_loss: 1.101,
            take_profit: Some(1.098),
            lot_size: 0.5,
            ..eurusd_buy(user_id, account_id)
        };
        let trade = ledger.open_trade(params).await.unwrap();

        // Price fell through the target; exit at 1.0980 = +20 pips for a seller.
        let closed = ledger.close_trade(trade.id, 1.097, false).await.unwrap();
        assert_eq!(closed.pnl, Some(100.0));
        assert_eq!(closed.outcome_score, Some(OUTCOME_WIN));
    }

    #[tokio::test]
    async fn uncrossed_thresholds_exit_at_the_supplied_price() {
        let (_db, ledger, user_id, account_id) = setup().await;

        let trade = ledger.open_trade(eurusd_buy(user_id, account_id)).await.unwrap();
        // 1.1005 sits between the 1.0990 stop and the 1.1020 target.
        let closed = ledger.close_trade(trade.id, 1.1005, false).await.unwrap();

        // 5 pips * $10 * 1.0 lot
        assert_eq!(closed.pnl, Some(50.0));
    }

    #[tokio::test]
    async fn manual_close_ignores_thresholds() {
        let (_db, ledger, user_id, account_id) = setup().await;

        let trade = ledger.open_trade(eurusd_buy(user_id, account_id)).await.unwrap();
        // Price is past the take-profit but the manual close uses it as-is.
        let closed = ledger.close_trade(trade.id, 1.105, true).await.unwrap();

        // 50 pips * $10 * 1.0 lot
        assert_eq!(closed.pnl, Some(500.0));
    }

    #[tokio::test]
    async fn flat_close_scores_neutral() {
        let (db, ledger, user_id, account_id) = setup().await;

        let trade = ledger.open_trade(eurusd_buy(user_id, account_id)).await.unwrap();
        let closed = ledger.close_trade(trade.id, 1.1, true).await.unwrap();

        assert_eq!(closed.pnl, Some(0.0));
        assert_eq!(closed.outcome_score, Some(OUTCOME_NEUTRAL));

        let account = db.get_account(user_id, account_id).await.unwrap().unwrap();
        assert_eq!(account.balance, 1000.0);
    }

    #[tokio::test]
    async fn jpy_pair_settles_through_converted_pip_value() {
        let (_db, ledger, user_id, account_id) = setup().await;

        let params = OpenTrade {
            symbol: "USDJPY".to_string(),
            entry_price: 150.0,
            stop_loss: 149.9,
            take_profit: None,
            lot_size: 1.0,
            ..eurusd_buy(user_id, account_id)
        };
        let trade = ledger.open_trade(params).await.unwrap();

        // +10 pips at 1000/150 dollars per pip
        let closed = ledger.close_trade(trade.id, 150.1, true).await.unwrap();
        assert_eq!(closed.pnl, Some(66.6667));
    }

    #[tokio::test]
    async fn balance_delta_equals_stored_pnl() {
        let (db, ledger, user_id, account_id) = setup().await;

        let before = db.get_account(user_id, account_id).await.unwrap().unwrap().balance;

        let trade = ledger.open_trade(eurusd_buy(user_id, account_id)).await.unwrap();
        let closed = ledger.close_trade(trade.id, 1.1037, true).await.unwrap();

        let after = db.get_account(user_id, account_id).await.unwrap().unwrap().balance;
        assert_eq!(after - before, closed.pnl.unwrap());
    }

    #[tokio::test]
    async fn skipped_trade_cannot_be_closed() {
        let (db, ledger, user_id, account_id) = setup().await;

        let skipped = db
            .record_skipped_trade(user_id, account_id, "EURUSD", 0.4, 1.1, None)
            .await
            .unwrap();

        let err = ledger.close_trade(skipped.id, 1.2, true).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotOpen { .. }));
    }
}
