//! Prediction-to-action classification and TP/SL placement.

use std::collections::HashMap;

use crate::models::TradeSide;

use super::pips::pip_size;

/// Action decided from a prediction's confidence scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictedAction {
    Buy,
    Sell,
    DontEnter,
}

impl PredictedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictedAction::Buy => "Buy",
            PredictedAction::Sell => "Sell",
            PredictedAction::DontEnter => "Don't Enter",
        }
    }

    /// The trade side this action maps to, if it enters at all.
    pub fn side(&self) -> Option<TradeSide> {
        match self {
            PredictedAction::Buy => Some(TradeSide::Buy),
            PredictedAction::Sell => Some(TradeSide::Sell),
            PredictedAction::DontEnter => None,
        }
    }
}

/// Pick the action from a label -> confidence map: the label with the
/// highest confidence wins, mapped case-insensitively. Unknown labels and
/// the empty map mean "Don't Enter".
pub fn decide_action(confidence_scores: &HashMap<String, f64>) -> PredictedAction {
    let Some((top_label, _)) = confidence_scores
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
    else {
        return PredictedAction::DontEnter;
    };

    match top_label.to_lowercase().as_str() {
        "strong uptrend" | "buy" => PredictedAction::Buy,
        "strong downtrend" | "sell" => PredictedAction::Sell,
        _ => PredictedAction::DontEnter,
    }
}

/// Place take-profit and stop-loss around the last close.
///
/// The stop sits `sl_pips` away against the direction of the trade and
/// the target `sl_pips * risk_reward_ratio` in its favor. Returns
/// `(take_profit, stop_loss)` rounded to 5 decimals, or `None` when the
/// action does not enter.
pub fn calculate_tp_sl(
    last_close: f64,
    action: PredictedAction,
    symbol: &str,
    sl_pips: f64,
    risk_reward_ratio: f64,
) -> Option<(f64, f64)> {
    let pip = pip_size(symbol);
    let tp_pips = sl_pips * risk_reward_ratio;

    let (tp, sl) = match action {
        PredictedAction::Buy => (last_close + tp_pips * pip, last_close - sl_pips * pip),
        PredictedAction::Sell => (last_close - tp_pips * pip, last_close + sl_pips * pip),
        PredictedAction::DontEnter => return None,
    };

    Some((round5(tp), round5(sl)))
}

fn round5(value: f64) -> f64 {
    (value * 100_000.0).round() / 100_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn highest_confidence_label_wins() {
        let s = scores(&[
            ("Strong Uptrend", 0.7),
            ("Strong Downtrend", 0.2),
            ("No Clear Trend", 0.1),
        ]);
        assert_eq!(decide_action(&s), PredictedAction::Buy);

        let s = scores(&[("strong downtrend", 0.9), ("buy", 0.1)]);
        assert_eq!(decide_action(&s), PredictedAction::Sell);
    }

    #[test]
    fn plain_buy_sell_labels_map() {
        assert_eq!(decide_action(&scores(&[("BUY", 0.8)])), PredictedAction::Buy);
        assert_eq!(decide_action(&scores(&[("Sell", 0.8)])), PredictedAction::Sell);
    }

    #[test]
    fn unknown_or_empty_means_dont_enter() {
        assert_eq!(decide_action(&HashMap::new()), PredictedAction::DontEnter);
        let s = scores(&[("No Clear Trend", 0.9), ("buy", 0.1)]);
        assert_eq!(decide_action(&s), PredictedAction::DontEnter);
    }

    #[test]
    fn buy_levels_bracket_the_close() {
        // 10 pip stop, 2:1 reward on EURUSD at 1.1000
        let (tp, sl) = calculate_tp_sl(1.1, PredictedAction::Buy, "EURUSD", 10.0, 2.0).unwrap();
        assert_eq!(sl, 1.099);
        assert_eq!(tp, 1.102);
    }

    #[test]
    fn sell_levels_are_mirrored() {
        let (tp, sl) = calculate_tp_sl(1.1, PredictedAction::Sell, "EURUSD", 10.0, 2.0).unwrap();
        assert_eq!(sl, 1.101);
        assert_eq!(tp, 1.098);
    }

    #[test]
    fn jpy_pairs_use_the_larger_pip() {
        let (tp, sl) = calculate_tp_sl(150.0, PredictedAction::Buy, "USDJPY", 10.0, 2.0).unwrap();
        assert_eq!(sl, 149.9);
        assert_eq!(tp, 150.2);
    }

    #[test]
    fn dont_enter_has_no_levels() {
        assert_eq!(
            calculate_tp_sl(1.1, PredictedAction::DontEnter, "EURUSD", 10.0, 2.0),
            None
        );
    }
}
