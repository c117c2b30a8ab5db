use std::collections::HashMap;

use tracing::{debug, info};

use crate::errors::AppError;
use crate::models::candle::Candle;
use crate::models::pivot::Pivot;
use crate::models::strategy::{BacktestConfig, TimeframeConfig};

use super::aggregator::aggregate;
use super::pivots::{detect_all, PivotRules};
use super::timeline::BaseTimeline;

/// One configured timeframe: its derived candles and detected pivots.
#[derive(Debug, Clone)]
pub struct TimeframeSeries {
    pub config: TimeframeConfig,
    pub candles: Vec<Candle>,
    pub pivots: Vec<Pivot>,
}

impl TimeframeSeries {
    pub fn label(&self) -> &str {
        self.config.interval.as_str()
    }
}

/// Read-only market state for one backtest run, passed explicitly to each component.
#[derive(Debug)]
pub struct SimulationContext<'a> {
    pub config: &'a BacktestConfig,
    pub timeline: BaseTimeline,
    pub frames: Vec<TimeframeSeries>,
    primary: usize,
    primary_pivot_by_time: HashMap<i64, usize>,
}

impl<'a> SimulationContext<'a> {
    /// Aggregate every configured timeframe from the base series and detect its pivots.
    pub fn build(base: &[Candle], config: &'a BacktestConfig) -> Result<Self, AppError> {
        let primary_interval = config.primary_timeframe()?.interval.clone();
        let timeline = BaseTimeline::new(base)?;

        let mut frames = Vec::with_capacity(config.timeframes.len());
        for tf in &config.timeframes {
            let candles = aggregate(timeline.candles(), &tf.interval);
            let rules = PivotRules::from_config(tf, config.pivot_detection_mode);
            let pivots = detect_all(&candles, &rules, tf.interval.as_str());
            debug!(
                "{}: {} candles, {} pivots",
                tf.interval,
                candles.len(),
                pivots.len()
            );
            frames.push(TimeframeSeries {
                config: tf.clone(),
                candles,
                pivots,
            });
        }

        let primary = frames
            .iter()
            .position(|f| f.config.interval == primary_interval)
            .ok_or(AppError::MissingPrimaryTimeframe)?;

        let primary_pivot_by_time = frames[primary]
            .pivots
            .iter()
            .enumerate()
            .map(|(i, p)| (p.time, i))
            .collect();

        let total_pivots: usize = frames.iter().map(|f| f.pivots.len()).sum();
        info!(
            "Context ready: {} base candles, {} timeframes, {} pivots",
            timeline.len(),
            frames.len(),
            total_pivots
        );

        Ok(SimulationContext {
            config,
            timeline,
            frames,
            primary,
            primary_pivot_by_time,
        })
    }

    pub fn primary(&self) -> &TimeframeSeries {
        &self.frames[self.primary]
    }

    /// Every configured timeframe except the primary one.
    pub fn secondaries(&self) -> impl Iterator<Item = &TimeframeSeries> {
        let primary = self.primary;
        self.frames
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != primary)
            .map(|(_, f)| f)
    }

    /// The primary pivot stamped exactly at `time`, if any.
    pub fn primary_pivot_at(&self, time: i64) -> Option<&Pivot> {
        self.primary_pivot_by_time
            .get(&time)
            .map(|&i| &self.frames[self.primary].pivots[i])
    }
}
