use std::collections::HashMap;

use crate::errors::AppError;
use crate::models::candle::Candle;

/// Base-resolution (finest) candle series with a timestamp index.
///
/// Candles are kept in strictly ascending time order; duplicate timestamps
/// keep the last occurrence.
#[derive(Debug, Clone)]
pub struct BaseTimeline {
    candles: Vec<Candle>,
    index_by_time: HashMap<i64, usize>,
}

impl BaseTimeline {
    pub fn new(candles: &[Candle]) -> Result<Self, AppError> {
        if candles.is_empty() {
            return Err(AppError::MissingBaseSeries);
        }

        let mut sorted = candles.to_vec();
        sorted.sort_by_key(|c| c.time);
        let mut deduped: Vec<Candle> = Vec::with_capacity(sorted.len());
        for candle in sorted {
            match deduped.last_mut() {
                Some(last) if last.time == candle.time => *last = candle,
                _ => deduped.push(candle),
            }
        }

        let index_by_time = deduped
            .iter()
            .enumerate()
            .map(|(i, c)| (c.time, i))
            .collect();

        Ok(BaseTimeline {
            candles: deduped,
            index_by_time,
        })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Candles with `start_exclusive < time <= end_inclusive`, ascending.
    pub fn range(&self, start_exclusive: i64, end_inclusive: i64) -> &[Candle] {
        let lo = self.candles.partition_point(|c| c.time <= start_exclusive);
        let hi = self.candles.partition_point(|c| c.time <= end_inclusive);
        &self.candles[lo..hi.max(lo)]
    }

    pub fn at(&self, time: i64) -> Option<&Candle> {
        self.index_by_time.get(&time).map(|&i| &self.candles[i])
    }

    /// Close at exactly `time`, else the close of the nearest candle within
    /// `tolerance_ms`. The earlier candle wins when two are equally near.
    pub fn close_near(&self, time: i64, tolerance_ms: i64) -> Option<f64> {
        if let Some(candle) = self.at(time) {
            return Some(candle.close);
        }

        let after = self.candles.partition_point(|c| c.time < time);
        let before = after.checked_sub(1).map(|i| &self.candles[i]);
        let next = self.candles.get(after);

        let nearest = match (before, next) {
            (Some(b), Some(n)) => {
                if time - b.time <= n.time - time {
                    b
                } else {
                    n
                }
            }
            (Some(b), None) => b,
            (None, Some(n)) => n,
            (None, None) => return None,
        };

        ((nearest.time - time).abs() <= tolerance_ms).then_some(nearest.close)
    }
}
