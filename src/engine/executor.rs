use tracing::{debug, info};

use crate::errors::AppError;
use crate::models::candle::Candle;
use crate::models::result::{BacktestResults, SignalCounters};
use crate::models::strategy::{BacktestConfig, TradingMode};

use super::cascade::{effective_window_ms, CascadeEngine, ExecutionEvent};
use super::context::SimulationContext;
use super::metrics::{calculate_summary, RunTotals};
use super::simulator::{EntryDecision, TradeSimulator};

/// Run a complete backtest over a base-resolution candle series.
///
/// One pass over the primary timeframe. For each primary candle the base ticks
/// in `(time - interval, time]` are replayed in order: funding, trade updates,
/// window evaluation. A pivot on the primary candle then opens a window (or
/// trades directly in pivot mode).
pub fn run_backtest(
    base: &[Candle],
    config: &BacktestConfig,
    progress_callback: impl Fn(u8, usize, usize),
) -> Result<BacktestResults, AppError> {
    config.validate()?;
    info!(
        "Starting backtest: {} base candles, {} timeframes, mode={:?}",
        base.len(),
        config.timeframes.len(),
        config.trading_mode
    );

    let ctx = SimulationContext::build(base, config)?;
    let primary = ctx.primary();
    let interval_ms = primary.config.interval.interval_ms();
    let label = primary.label().to_string();

    let mut cascade = CascadeEngine::new(effective_window_ms(&primary.config));
    let mut simulator = TradeSimulator::new(&config.trade)?;
    let mut counters = SignalCounters::default();

    let total_bars = primary.candles.len();
    let report_every = (total_bars / 100).max(1);

    for (i, candle) in primary.candles.iter().enumerate() {
        if i % report_every == 0 {
            let pct = (i as f64 / total_bars as f64 * 100.0) as u8;
            progress_callback(pct, i, total_bars);
        }

        // ── 1. Replay the base ticks behind this primary candle ──
        for tick in ctx.timeline.range(candle.time - interval_ms, candle.time) {
            simulator.apply_funding(tick.time);
            simulator.update(tick);

            let outcome = cascade.evaluate(tick.time, &ctx);
            counters.expired_windows += outcome.expired.len();
            for event in &outcome.executions {
                execute_event(&mut simulator, &mut counters, event, &label);
            }
        }

        // ── 2. New primary signal ──
        if let Some(pivot) = ctx.primary_pivot_at(candle.time) {
            counters.total_signals += 1;
            match config.trading_mode {
                TradingMode::Cascade => {
                    cascade.open_window(pivot.clone(), candle.time);
                }
                TradingMode::Pivot => {
                    let event = ExecutionEvent::immediate(pivot.clone());
                    execute_event(&mut simulator, &mut counters, &event, &label);
                }
            }
        }
    }

    if !cascade.is_empty() {
        debug!("{} windows still pending at end of data", cascade.len());
    }
    if let Some(last) = ctx.timeline.last() {
        simulator.liquidate(last);
    }
    progress_callback(100, total_bars, total_bars);

    let data_span_ms = match (ctx.timeline.first(), ctx.timeline.last()) {
        (Some(first), Some(last)) => last.time - first.time,
        _ => 0,
    };
    let account_funding = simulator.account_funding();
    let (trades, equity_curve, final_capital) = simulator.into_parts();
    let summary = calculate_summary(
        &trades,
        &equity_curve,
        &counters,
        RunTotals {
            initial_capital: config.trade.initial_capital,
            final_capital,
            data_span_ms,
            account_funding,
        },
    );

    info!(
        "Backtest complete: {} signals, {} confirmed, {} trades, return={:.2}%",
        summary.total_signals,
        summary.confirmed_signals,
        summary.total_trades,
        summary.total_return_pct
    );

    Ok(BacktestResults {
        trades,
        equity_curve,
        summary,
    })
}

fn execute_event(
    simulator: &mut TradeSimulator,
    counters: &mut SignalCounters,
    event: &ExecutionEvent,
    timeframe: &str,
) {
    counters.confirmed_signals += 1;
    match simulator.execute(event, timeframe) {
        EntryDecision::Opened(id) => {
            counters.executed_trades += 1;
            debug!("Trade {} opened from pivot @ {}", id, event.primary_pivot.time);
        }
        EntryDecision::RejectedDirection => counters.rejected_by_direction += 1,
        EntryDecision::RejectedCapacity => counters.rejected_by_capacity += 1,
        EntryDecision::RejectedNoTradeDay => counters.rejected_no_trade_day += 1,
    }
}
