use std::collections::BTreeMap;

use crate::errors::AppError;
use crate::models::candle::Candle;
use crate::models::config::Timeframe;

/// Aggregate a base series into `timeframe` candles.
///
/// Buckets are keyed by `floor(time / interval_ms) * interval_ms` and each merged
/// candle is stamped with its window END (`bucket_start + interval_ms`). Empty
/// buckets produce nothing. A series that is already at the target granularity
/// is returned unchanged, so aggregating twice never shifts timestamps.
///
/// Granularity is judged from the timestamps alone. A sparse raw series whose
/// candles all sit on the target grid, at least one interval apart, is taken as
/// already aggregated and keeps its stamps: a lone 1m candle at 5m aggregated to
/// `5m` stays at 5m rather than moving to 10m.
pub fn aggregate(base: &[Candle], timeframe: &Timeframe) -> Vec<Candle> {
    let interval_ms = timeframe.interval_ms();

    if is_at_granularity(base, interval_ms) {
        return base.to_vec();
    }

    let mut buckets: BTreeMap<i64, Candle> = BTreeMap::new();
    for candle in sorted_by_time(base) {
        let window_start = candle.time.div_euclid(interval_ms) * interval_ms;
        buckets
            .entry(window_start)
            .and_modify(|agg| {
                agg.high = agg.high.max(candle.high);
                agg.low = agg.low.min(candle.low);
                agg.close = candle.close;
                agg.volume += candle.volume;
            })
            .or_insert(Candle {
                time: window_start + interval_ms,
                ..*candle
            });
    }

    buckets.into_values().collect()
}

/// Parse `interval` and aggregate. Fails with `InvalidTimeframe` on a bad string.
pub fn aggregate_str(base: &[Candle], interval: &str) -> Result<Vec<Candle>, AppError> {
    let timeframe: Timeframe = interval.parse()?;
    Ok(aggregate(base, &timeframe))
}

/// True if every timestamp sits on the interval grid and consecutive candles are
/// at least one interval apart.
fn is_at_granularity(candles: &[Candle], interval_ms: i64) -> bool {
    !candles.is_empty()
        && candles.iter().all(|c| c.time.rem_euclid(interval_ms) == 0)
        && candles.windows(2).all(|w| w[1].time - w[0].time >= interval_ms)
}

fn sorted_by_time(candles: &[Candle]) -> Vec<&Candle> {
    let mut sorted: Vec<&Candle> = candles.iter().collect();
    sorted.sort_by_key(|c| c.time);
    sorted
}
