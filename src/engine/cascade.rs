//! Cascade confirmation: pending windows opened by primary pivots, confirmed by
//! matching pivots on the other timeframes.
//!
//! Each window moves `Open -> Confirmed` or `Open -> Expired`; both are terminal
//! and remove the window from the pending set on the tick they happen.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::models::config::MS_PER_MINUTE;
use crate::models::pivot::Pivot;
use crate::models::strategy::{CascadeSettings, TimeframeConfig, TimeframeRole};

use super::context::SimulationContext;

/// Hard upper bound on any confirmation window.
pub const PROXIMITY_WINDOW_MS: i64 = 5 * MS_PER_MINUTE;

/// How far from the delayed entry time a base candle may be and still price the entry.
pub const ENTRY_PRICE_TOLERANCE_MS: i64 = 30 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WindowId(u64);

/// A primary pivot waiting for confirmations.
#[derive(Debug, Clone)]
pub struct ConfirmationWindow {
    pub id: WindowId,
    pub primary_pivot: Pivot,
    pub created_at: i64,
    /// Last tick time at which the window may still confirm.
    pub expires_at: i64,
}

/// One timeframe's agreement with a primary pivot. Computed fresh on every evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Confirmation {
    pub timeframe: String,
    pub role: TimeframeRole,
    pub weight: f64,
    pub pivot: Pivot,
    /// This timeframe confirms with the opposite signal.
    pub inverted: bool,
}

/// A confirmed, priced signal ready for the trade simulator.
#[derive(Debug, Clone)]
pub struct ExecutionEvent {
    pub window_id: Option<WindowId>,
    pub primary_pivot: Pivot,
    pub confirmations: Vec<Confirmation>,
    /// `max(primary pivot time, latest confirming pivot time)`.
    pub execution_time: i64,
    /// Execution time plus the configured entry delay.
    pub entry_time: i64,
    pub entry_price: f64,
}

impl ExecutionEvent {
    /// Execute a pivot directly at its own time and price.
    pub fn immediate(pivot: Pivot) -> Self {
        ExecutionEvent {
            window_id: None,
            execution_time: pivot.time,
            entry_time: pivot.time,
            entry_price: pivot.price,
            primary_pivot: pivot,
            confirmations: Vec::new(),
        }
    }
}

/// What happened to the pending set during one evaluation.
#[derive(Debug, Default)]
pub struct CascadeOutcome {
    pub executions: Vec<ExecutionEvent>,
    pub expired: Vec<WindowId>,
}

/// `min(PROXIMITY_WINDOW_MS, configured bound for the primary timeframe)`.
pub fn effective_window_ms(primary: &TimeframeConfig) -> i64 {
    match primary.confirmation_window_minutes {
        Some(minutes) => PROXIMITY_WINDOW_MS.min(minutes as i64 * MS_PER_MINUTE),
        None => PROXIMITY_WINDOW_MS,
    }
}

/// Owns the pending confirmation windows, keyed by creation order.
#[derive(Debug)]
pub struct CascadeEngine {
    windows: BTreeMap<WindowId, ConfirmationWindow>,
    next_id: u64,
    window_ms: i64,
}

impl CascadeEngine {
    pub fn new(window_ms: i64) -> Self {
        CascadeEngine {
            windows: BTreeMap::new(),
            next_id: 0,
            window_ms,
        }
    }

    pub fn open_window(&mut self, primary_pivot: Pivot, created_at: i64) -> WindowId {
        let id = WindowId(self.next_id);
        self.next_id += 1;
        let expires_at = primary_pivot.time + self.window_ms;
        debug!(
            "Window {:?} opened for {:?} pivot @ {} (expires {})",
            id, primary_pivot.signal, primary_pivot.time, expires_at
        );
        self.windows.insert(
            id,
            ConfirmationWindow {
                id,
                primary_pivot,
                created_at,
                expires_at,
            },
        );
        id
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.windows.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Evaluate every pending window once at base tick `now`, oldest first.
    ///
    /// Windows past their deadline are expired. Windows that meet the execution
    /// requirements and can be priced are executed. A confirmed window with no
    /// usable entry price stays pending.
    pub fn evaluate(&mut self, now: i64, ctx: &SimulationContext) -> CascadeOutcome {
        let mut outcome = CascadeOutcome::default();
        let mut finished: Vec<WindowId> = Vec::new();

        for window in self.windows.values() {
            if now > window.expires_at {
                debug!("Window {:?} expired at {}", window.id, now);
                outcome.expired.push(window.id);
                finished.push(window.id);
                continue;
            }

            let confirmations = collect_confirmations(window, now, self.window_ms, ctx);
            if !meets_execution_requirements(&confirmations, &ctx.config.cascade) {
                continue;
            }

            let execution_time = confirmations
                .iter()
                .map(|c| c.pivot.time)
                .fold(window.primary_pivot.time, i64::max);
            let delay_ms = ctx.config.trade.entry_delay_minutes as i64 * MS_PER_MINUTE;
            let entry_time = execution_time + delay_ms;

            let Some(entry_price) = ctx.timeline.close_near(entry_time, ENTRY_PRICE_TOLERANCE_MS)
            else {
                debug!("Window {:?} confirmed but no price near {}", window.id, entry_time);
                continue;
            };

            debug!(
                "Window {:?} confirmed by {} timeframes, entry {} @ {}",
                window.id,
                confirmations.len(),
                entry_price,
                entry_time
            );
            outcome.executions.push(ExecutionEvent {
                window_id: Some(window.id),
                primary_pivot: window.primary_pivot.clone(),
                confirmations,
                execution_time,
                entry_time,
                entry_price,
            });
            finished.push(window.id);
        }

        for id in finished {
            self.windows.remove(&id);
        }
        outcome
    }
}

/// The primary pivot's own confirmation plus at most one matching pivot per
/// secondary timeframe, searched within the window and never after `now`.
pub fn collect_confirmations(
    window: &ConfirmationWindow,
    now: i64,
    window_ms: i64,
    ctx: &SimulationContext,
) -> Vec<Confirmation> {
    let primary = &window.primary_pivot;
    let primary_cfg = &ctx.primary().config;

    let mut confirmations = vec![Confirmation {
        timeframe: primary_cfg.interval.to_string(),
        role: primary_cfg.effective_confirmation_role(),
        weight: primary_cfg.weight,
        pivot: primary.clone(),
        inverted: false,
    }];

    let earliest = primary.time - window_ms;
    let latest = (primary.time + window_ms).min(now);

    for frame in ctx.secondaries() {
        let target = if frame.config.opposite {
            primary.signal.opposite()
        } else {
            primary.signal
        };

        let start = frame.pivots.partition_point(|p| p.time < earliest);
        let matched = frame.pivots[start..]
            .iter()
            .take_while(|p| p.time <= latest)
            .find(|p| p.signal == target);

        if let Some(pivot) = matched {
            confirmations.push(Confirmation {
                timeframe: frame.label().to_string(),
                role: frame.config.effective_confirmation_role(),
                weight: frame.config.weight,
                pivot: pivot.clone(),
                inverted: frame.config.opposite,
            });
        }
    }

    confirmations
}

pub fn meets_execution_requirements(
    confirmations: &[Confirmation],
    settings: &CascadeSettings,
) -> bool {
    if confirmations.len() < settings.min_timeframes_required {
        return false;
    }
    !settings.require_primary_timeframe
        || confirmations.iter().any(|c| c.role == TimeframeRole::Primary)
}
