//! Market data feed: CSV candle files and the trend prediction source.
//!
//! The agent only needs two things from a feed: a finite sequence of
//! (label, confidence map) predictions and the latest close for entry
//! pricing. `CsvTrendSource` implements both over `<SYMBOL>_<tf>.csv`
//! candle files using a moving-average spread as the trend signal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Trend labels emitted by the CSV source.
const LABEL_UP: &str = "Strong Uptrend";
const LABEL_DOWN: &str = "Strong Downtrend";
const LABEL_FLAT: &str = "No Clear Trend";

/// A source of directional predictions and current prices.
///
/// `predict` returns a finite sequence; the decision is taken from the
/// last element.
pub trait PredictionSource {
    fn predict(&self, symbol: &str, timeframe: &str) -> Result<Vec<(String, HashMap<String, f64>)>>;

    /// Most recent close for the symbol, used as the entry price.
    fn last_close(&self, symbol: &str, timeframe: &str) -> Result<f64>;
}

/// Prediction source backed by CSV candle files in a data directory.
///
/// Labels the trend from the spread between a fast and a slow simple
/// moving average of closes; the wider the spread, the higher the
/// confidence.
pub struct CsvTrendSource {
    data_dir: PathBuf,
    fast_period: usize,
    slow_period: usize,
}

impl CsvTrendSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            fast_period: 10,
            slow_period: 50,
        }
    }

    /// Path of the candle file for a symbol/timeframe.
    pub fn candle_file(&self, symbol: &str, timeframe: &str) -> PathBuf {
        let suffix = timeframe_suffix(timeframe);
        self.data_dir
            .join(format!("{}_{suffix}.csv", symbol.to_uppercase()))
    }

    fn closes(&self, symbol: &str, timeframe: &str) -> Result<Vec<f64>> {
        let path = self.candle_file(symbol, timeframe);
        load_closes(&path)
    }
}

impl PredictionSource for CsvTrendSource {
    fn predict(&self, symbol: &str, timeframe: &str) -> Result<Vec<(String, HashMap<String, f64>)>> {
        let closes = self.closes(symbol, timeframe)?;

        if closes.len() < self.slow_period {
            // Not enough history to call a trend.
            return Ok(vec![(
                LABEL_FLAT.to_string(),
                confidence_map(LABEL_FLAT, 0.9),
            )]);
        }

        let fast = sma(&closes, self.fast_period);
        let slow = sma(&closes, self.slow_period);
        let spread = (fast - slow) / slow;

        // Below two basis points of spread the averages are effectively
        // on top of each other.
        let label = if spread.abs() < 2e-4 {
            LABEL_FLAT
        } else if spread > 0.0 {
            LABEL_UP
        } else {
            LABEL_DOWN
        };

        let confidence = if label == LABEL_FLAT {
            0.9
        } else {
            0.5 + (spread.abs() * 400.0).min(0.45)
        };

        Ok(vec![(label.to_string(), confidence_map(label, confidence))])
    }

    fn last_close(&self, symbol: &str, timeframe: &str) -> Result<f64> {
        let closes = self.closes(symbol, timeframe)?;
        closes
            .last()
            .copied()
            .with_context(|| format!("no candles for {symbol} {timeframe}"))
    }
}

/// Mean of the last `period` closes.
fn sma(closes: &[f64], period: usize) -> f64 {
    let window = &closes[closes.len() - period..];
    window.iter().sum::<f64>() / period as f64
}

/// Confidence map over all three labels: the winner gets `confidence`,
/// the rest split the remainder.
fn confidence_map(winner: &str, confidence: f64) -> HashMap<String, f64> {
    let rest = (1.0 - confidence) / 2.0;
    [LABEL_UP, LABEL_DOWN, LABEL_FLAT]
        .iter()
        .map(|label| {
            let score = if *label == winner { confidence } else { rest };
            (label.to_string(), score)
        })
        .collect()
}

/// Read the `Close` column from a candle CSV (header row required,
/// column match is case-insensitive).
pub fn load_closes(path: &Path) -> Result<Vec<f64>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open candle file {}", path.display()))?;

    let headers = reader.headers().context("Candle file has no header row")?;
    let Some(close_idx) = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("close"))
    else {
        bail!("candle file {} has no Close column", path.display());
    };

    let mut closes = Vec::new();
    for record in reader.records() {
        let record = record.context("Failed to read candle row")?;
        let raw = record
            .get(close_idx)
            .with_context(|| format!("short row in {}", path.display()))?;
        let close: f64 = raw
            .trim()
            .parse()
            .with_context(|| format!("bad close value {raw:?} in {}", path.display()))?;
        closes.push(close);
    }

    Ok(closes)
}

/// Map a timeframe label to the candle file suffix used by the data
/// folder layout ("EURUSD_60min.csv" for the 1h timeframe).
fn timeframe_suffix(timeframe: &str) -> String {
    match timeframe.to_lowercase().as_str() {
        "15m" => "15min".to_string(),
        "30m" => "30min".to_string(),
        "1h" => "60min".to_string(),
        "4h" => "240min".to_string(),
        "1d" => "1440min".to_string(),
        other => other.to_string(),
    }
}
