//! Agent loop: one prediction-to-trade cycle per interval.
//!
//! Each cycle: predict -> decide -> place TP/SL around the last close ->
//! record the signal -> size and open the trade (or record a skip) ->
//! notify the user. Cycle errors are logged and the loop keeps running.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::time::interval;
use tracing::{error, info};

use crate::db::Database;
use crate::feed::PredictionSource;
use crate::models::{Account, Signal, Trade};
use crate::notify::Notifier;
use crate::trading::{
    calculate_tp_sl, decide_action, size_position, OpenTrade, PredictedAction, RiskConfig,
    TradeLedger,
};

/// Agent configuration. Every parameter is explicit; nothing is read
/// from mutable global state between cycles.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub user_id: i64,
    pub account_id: i64,
    pub symbol: String,
    pub timeframe: String,

    /// Seconds between cycles
    pub interval_secs: u64,

    pub risk: RiskConfig,
}

/// Result of a single agent cycle.
#[derive(Debug)]
pub struct CycleOutcome {
    pub action: PredictedAction,
    pub confidence: f64,
    pub signal: Signal,
    /// The opened trade, or the SKIPPED record for a Don't Enter decision
    pub trade: Trade,
}

/// Signal-to-trade agent for one user/account/symbol.
pub struct Agent<S: PredictionSource> {
    config: AgentConfig,
    db: Database,
    ledger: TradeLedger,
    source: S,
    notifier: Notifier,
}

impl<S: PredictionSource> Agent<S> {
    pub fn new(config: AgentConfig, db: Database, source: S, notifier: Notifier) -> Self {
        let ledger = TradeLedger::new(&db);
        Self {
            config,
            db,
            ledger,
            source,
            notifier,
        }
    }

    /// Run cycles until ctrl-c.
    pub async fn run(&self) -> Result<()> {
        info!(
            symbol = %self.config.symbol,
            timeframe = %self.config.timeframe,
            interval = self.config.interval_secs,
            "Starting agent loop"
        );

        let open = self.db.get_open_trades(self.config.account_id).await?;
        if !open.is_empty() {
            info!(count = open.len(), "Account already has open trades");
        }

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(outcome) => {
                            info!(
                                action = outcome.action.as_str(),
                                confidence = outcome.confidence,
                                trade_id = outcome.trade.id,
                                "Cycle complete"
                            );
                            println!(
                                "[{}] {} {} (confidence {:.1}%) -> trade {} [{}]",
                                chrono::Local::now().format("%H:%M:%S"),
                                outcome.trade.symbol,
                                outcome.action.as_str(),
                                outcome.confidence * 100.0,
                                outcome.trade.id,
                                outcome.trade.status,
                            );
                        }
                        Err(e) => {
                            error!(error = %e, "Cycle failed");
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Execute one full cycle and return what was decided and recorded.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let symbol = &self.config.symbol;
        let timeframe = &self.config.timeframe;
        let risk = &self.config.risk;

        let predictions = self.source.predict(symbol, timeframe)?;
        // The sequence is most-recent-last; the decision comes from the
        // final element.
        let Some((_, scores)) = predictions.last() else {
            bail!("prediction source returned no output for {symbol}");
        };

        let action = decide_action(scores);
        let confidence = scores.values().copied().fold(0.0, f64::max);
        let last_close = self.source.last_close(symbol, timeframe)?;

        let account = self
            .db
            .get_account(self.config.user_id, self.config.account_id)
            .await?
            .with_context(|| {
                format!(
                    "account {} not found for user {}",
                    self.config.account_id, self.config.user_id
                )
            })?;

        let signal = self
            .db
            .record_signal(
                self.config.user_id,
                symbol,
                timeframe,
                action.as_str(),
                confidence,
                last_close,
                risk.stop_loss_pips,
            )
            .await?;

        let trade = match action.side() {
            Some(side) => {
                let (take_profit, stop_loss) = calculate_tp_sl(
                    last_close,
                    action,
                    symbol,
                    risk.stop_loss_pips,
                    risk.risk_reward_ratio,
                )
                .context("no TP/SL for an entering action")?;

                let risk_fraction = if account.base_risk_pct > 0.0 {
                    account.base_risk_pct
                } else {
                    risk.fallback_risk_pct
                };

                let lot_size = size_position(
                    account.balance,
                    risk_fraction,
                    risk.stop_loss_pips,
                    symbol,
                    last_close,
                    &risk.lot_constraints(),
                );

                self.ledger
                    .open_trade(OpenTrade {
                        user_id: self.config.user_id,
                        account_id: account.id,
                        symbol: symbol.clone(),
                        side,
                        entry_price: last_close,
                        stop_loss,
                        take_profit: Some(take_profit),
                        lot_size,
                        confidence,
                        signal_id: Some(signal.id),
                    })
                    .await?
            }
            None => {
                self.db
                    .record_skipped_trade(
                        self.config.user_id,
                        account.id,
                        symbol,
                        confidence,
                        last_close,
                        Some(signal.id),
                    )
                    .await?
            }
        };

        self.notify(&account, action, confidence, &trade).await;

        Ok(CycleOutcome {
            action,
            confidence,
            signal,
            trade,
        })
    }

    /// Tell the user what was decided. Best-effort; a missing chat link
    /// or a delivery failure never fails the cycle.
    async fn notify(&self, account: &Account, action: PredictedAction, confidence: f64, trade: &Trade) {
        let user = match self.db.get_user(account.user_id).await {
            Ok(Some(user)) => user,
            _ => return,
        };
        let Some(chat_id) = user.telegram_chat_id else {
            return;
        };

        let text = match action.side() {
            Some(_) => format!(
                "[Signal] {} {} | Confidence: {:.2}% | Lot: {} | TP: {:?} | SL: {}",
                action.as_str(),
                trade.symbol,
                confidence * 100.0,
                trade.lot_size,
                trade.take_profit,
                trade.stop_loss,
            ),
            None => format!(
                "[Signal] {} {} | Confidence: {:.2}%",
                action.as_str(),
                trade.symbol,
                confidence * 100.0,
            ),
        };

        self.notifier.send(&chat_id, &text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TradeSide, TradeStatus};
    use std::collections::HashMap;

    /// Deterministic prediction source for cycle tests.
    struct FixedSource {
        label: &'static str,
        confidence: f64,
        close: f64,
    }

    impl PredictionSource for FixedSource {
        fn predict(
            &self,
            _symbol: &str,
            _timeframe: &str,
        ) -> Result<Vec<(String, HashMap<String, f64>)>> {
            let mut scores = HashMap::new();
            scores.insert(self.label.to_string(), self.confidence);
            Ok(vec![(self.label.to_string(), scores)])
        }

        fn last_close(&self, _symbol: &str, _timeframe: &str) -> Result<f64> {
            Ok(self.close)
        }
    }

    async fn agent_with(
        label: &'static str,
        confidence: f64,
        close: f64,
    ) -> (Agent<FixedSource>, i64, i64) {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let user = db.create_user("trader", None).await.unwrap();
        let account = db
            .create_account(user.id, "Main", 10_000.0, 0.01, 100)
            .await
            .unwrap();

        let config = AgentConfig {
            user_id: user.id,
            account_id: account.id,
            symbol: "EURUSD".to_string(),
            timeframe: "1h".to_string(),
            interval_secs: 3600,
            risk: RiskConfig::default(),
        };

        let source = FixedSource {
            label,
            confidence,
            close,
        };
        let notifier = Notifier::from_env();
        let agent = Agent::new(config, db, source, notifier);
        (agent, user.id, account.id)
    }

    #[tokio::test]
    async fn uptrend_cycle_opens_a_sized_buy() {
        let (agent, _user_id, account_id) = agent_with("Strong Uptrend", 0.8, 1.1).await;

        let outcome = agent.run_cycle().await.unwrap();

        assert_eq!(outcome.action, PredictedAction::Buy);
        let trade = &outcome.trade;
        assert_eq!(trade.status(), Some(TradeStatus::Open));
        assert_eq!(trade.side(), Some(TradeSide::Buy));
        assert_eq!(trade.account_id, account_id);
        // $10,000 at 1% risk over 10 pips at $10/pip
        assert_eq!(trade.lot_size, 1.0);
        assert_eq!(trade.entry_price, 1.1);
        assert_eq!(trade.stop_loss, 1.099);
        assert_eq!(trade.take_profit, Some(1.102));
        assert_eq!(trade.signal_id, Some(outcome.signal.id));
    }

    #[tokio::test]
    async fn downtrend_cycle_opens_a_sell_with_mirrored_levels() {
        let (agent, _, _) = agent_with("Strong Downtrend", 0.7, 1.1).await;

        let outcome = agent.run_cycle().await.unwrap();

        assert_eq!(outcome.action, PredictedAction::Sell);
        assert_eq!(outcome.trade.side(), Some(TradeSide::Sell));
        assert_eq!(outcome.trade.stop_loss, 1.101);
        assert_eq!(outcome.trade.take_profit, Some(1.098));
    }

    #[tokio::test]
    async fn no_trend_cycle_records_a_skip() {
        let (agent, user_id, _) = agent_with("No Clear Trend", 0.9, 1.1).await;

        let outcome = agent.run_cycle().await.unwrap();

        assert_eq!(outcome.action, PredictedAction::DontEnter);
        assert_eq!(outcome.trade.status(), Some(TradeStatus::Skipped));
        assert_eq!(outcome.trade.lot_size, 0.0);
        assert_eq!(outcome.trade.signal_id, Some(outcome.signal.id));

        // The signal is still recorded for the audit trail.
        let signals = agent.db.get_signals(user_id, 10).await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, "DON'T ENTER");
    }

    #[tokio::test]
    async fn every_cycle_records_exactly_one_signal() {
        let (agent, user_id, _) = agent_with("Strong Uptrend", 0.8, 1.1).await;

        agent.run_cycle().await.unwrap();
        agent.run_cycle().await.unwrap();

        let signals = agent.db.get_signals(user_id, 10).await.unwrap();
        assert_eq!(signals.len(), 2);
        let trades = agent.db.get_trades(user_id, None).await.unwrap();
        assert_eq!(trades.len(), 2);
    }
}
