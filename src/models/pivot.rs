use serde::{Deserialize, Serialize};

use super::trade::TradeDirection;

/// Which extreme a pivot marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PivotType {
    High,
    Low,
}

impl PivotType {
    /// Low pivots signal longs, high pivots signal shorts.
    pub fn signal(self) -> TradeDirection {
        match self {
            PivotType::High => TradeDirection::Short,
            PivotType::Low => TradeDirection::Long,
        }
    }
}

/// A detected local extremum on one timeframe's series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub pivot_type: PivotType,
    pub price: f64,
    pub time: i64,
    /// Position within the owning timeframe's candle series.
    pub index: usize,
    pub signal: TradeDirection,
    pub swing_pct: f64,
    pub timeframe: String,
}
