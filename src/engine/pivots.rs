use crate::models::candle::Candle;
use crate::models::pivot::{Pivot, PivotType};
use crate::models::strategy::{DetectionMode, TimeframeConfig};

use super::metrics::EPSILON;

/// Rules for pivot detection on one series.
#[derive(Debug, Clone, Copy)]
pub struct PivotRules {
    pub lookback: usize,
    pub min_swing_pct: f64,
    /// Minimum bars between accepted pivots (applied by [`detect_all`] only).
    pub min_leg_bars: usize,
    pub mode: DetectionMode,
}

impl PivotRules {
    pub fn from_config(tf: &TimeframeConfig, mode: DetectionMode) -> Self {
        PivotRules {
            lookback: tf.lookback,
            min_swing_pct: tf.min_swing_pct,
            min_leg_bars: tf.min_leg_bars,
            mode,
        }
    }
}

fn high_value(c: &Candle, mode: DetectionMode) -> f64 {
    match mode {
        DetectionMode::Close => c.close,
        DetectionMode::HighLow => c.high,
    }
}

fn low_value(c: &Candle, mode: DetectionMode) -> f64 {
    match mode {
        DetectionMode::Close => c.close,
        DetectionMode::HighLow => c.low,
    }
}

/// Decide whether `series[index]` is a pivot.
///
/// A high pivot strictly exceeds each of the `lookback` preceding candles, a low
/// pivot is strictly below each of them. With `lookback == 0` only the previous
/// candle is compared; if both directions qualify the larger excursion wins and
/// an exact tie goes to the high.
pub fn detect(
    series: &[Candle],
    index: usize,
    rules: &PivotRules,
    timeframe: &str,
) -> Option<Pivot> {
    if index >= series.len() {
        return None;
    }
    let span = rules.lookback.max(1);
    if index < span {
        return None;
    }

    let mode = rules.mode;
    let current = &series[index];
    let current_high = high_value(current, mode);
    let current_low = low_value(current, mode);
    let preceding = &series[index - span..index];

    let mut is_high = preceding.iter().all(|c| current_high > high_value(c, mode));
    let mut is_low = preceding.iter().all(|c| current_low < low_value(c, mode));

    if rules.lookback == 0 && is_high && is_low {
        let prev = &series[index - 1];
        let up_excursion = (current_high - high_value(prev, mode)).abs();
        let down_excursion = (low_value(prev, mode) - current_low).abs();
        if up_excursion >= down_excursion {
            is_low = false;
        } else {
            is_high = false;
        }
    }

    let pivot_type = match (is_high, is_low) {
        (true, _) => PivotType::High,
        (false, true) => PivotType::Low,
        (false, false) => return None,
    };
    let price = match pivot_type {
        PivotType::High => current_high,
        PivotType::Low => current_low,
    };

    let mut swing_pct = 0.0;
    if rules.min_swing_pct > 0.0 {
        swing_pct = preceding
            .iter()
            .map(|c| {
                let compare = match (mode, pivot_type) {
                    (DetectionMode::Close, _) => c.close,
                    (DetectionMode::HighLow, PivotType::High) => c.low,
                    (DetectionMode::HighLow, PivotType::Low) => c.high,
                };
                ((price - compare) / compare.abs().max(EPSILON) * 100.0).abs()
            })
            .fold(0.0, f64::max);

        if swing_pct < rules.min_swing_pct {
            return None;
        }
    }

    Some(Pivot {
        pivot_type,
        price,
        time: current.time,
        index,
        signal: pivot_type.signal(),
        swing_pct,
        timeframe: timeframe.to_string(),
    })
}

/// Scan a whole series, returning pivots in ascending time order.
///
/// When `min_leg_bars > 0`, a pivot closer than that many bars to the previous
/// accepted pivot is dropped.
pub fn detect_all(series: &[Candle], rules: &PivotRules, timeframe: &str) -> Vec<Pivot> {
    let mut pivots: Vec<Pivot> = Vec::new();
    for index in 0..series.len() {
        let Some(pivot) = detect(series, index, rules, timeframe) else {
            continue;
        };
        if rules.min_leg_bars > 0 {
            if let Some(last) = pivots.last() {
                if index - last.index < rules.min_leg_bars {
                    continue;
                }
            }
        }
        pivots.push(pivot);
    }
    pivots
}
