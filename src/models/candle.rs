use serde::{Deserialize, Serialize};

/// A single OHLCV candle/bar.
///
/// `time` is a millisecond timestamp. Aggregated candles are stamped with the
/// END of their window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
