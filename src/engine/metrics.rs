use statrs::statistics::Statistics;

use crate::models::result::{BacktestSummary, EquityPoint, SignalCounters};
use crate::models::trade::Trade;

/// Stand-in for a zero divisor in ratios (e.g. zero average loss) so a run
/// always produces a finite number instead of failing.
pub const EPSILON: f64 = 1e-9;

const MS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Run-level facts the summary needs besides the ledger.
#[derive(Debug, Clone, Copy)]
pub struct RunTotals {
    pub initial_capital: f64,
    pub final_capital: f64,
    /// Milliseconds between the first and last base candle.
    pub data_span_ms: i64,
    pub account_funding: f64,
}

/// Calculate all summary statistics from the ledger, capital curve and counters.
pub fn calculate_summary(
    trades: &[Trade],
    equity_curve: &[EquityPoint],
    counters: &SignalCounters,
    totals: RunTotals,
) -> BacktestSummary {
    let total_trades = trades.len();
    let initial_capital = totals.initial_capital;

    // ── Signals ──
    let rejected_signals = counters.rejected_by_direction
        + counters.rejected_by_capacity
        + counters.rejected_no_trade_day;
    let confirmation_rate_pct = ratio_pct(counters.confirmed_signals, counters.total_signals);
    let execution_rate_pct = ratio_pct(counters.executed_trades, counters.confirmed_signals);

    // ── Frequency ──
    let data_span_days = totals.data_span_ms.max(0) as f64 / MS_PER_DAY;
    let per_day = |count: usize| {
        if data_span_days > 0.0 {
            count as f64 / data_span_days
        } else {
            0.0
        }
    };

    // ── Trade classification ──
    let winning: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|&p| p > 0.0).collect();
    // Breakeven counts as a loss.
    let losing: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|&p| p <= 0.0).collect();
    let win_rate_pct = ratio_pct(winning.len(), total_trades);

    // ── P&L ──
    let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
    let gross_profit: f64 = winning.iter().sum();
    let gross_loss: f64 = losing.iter().map(|p| p.abs()).sum();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };
    let avg_win = mean_or_zero(&winning);
    let avg_loss = mean_or_zero(&losing);
    let payoff_ratio = if winning.is_empty() {
        0.0
    } else {
        avg_win / avg_loss.abs().max(EPSILON)
    };
    let largest_win = winning.iter().copied().fold(0.0f64, f64::max);
    let largest_loss = losing.iter().copied().fold(0.0f64, f64::min);

    // ── Returns ──
    let total_return_pct = if initial_capital > 0.0 {
        (totals.final_capital - initial_capital) / initial_capital * 100.0
    } else {
        0.0
    };

    // ── Risk ──
    let max_drawdown_pct = calculate_max_drawdown(initial_capital, equity_curve);
    let trade_returns: Vec<f64> = trades
        .iter()
        .map(|t| t.pnl / initial_capital.max(EPSILON))
        .collect();
    let sharpe_ratio = calculate_sharpe(&trade_returns);

    BacktestSummary {
        total_signals: counters.total_signals,
        confirmed_signals: counters.confirmed_signals,
        executed_trades: counters.executed_trades,
        expired_windows: counters.expired_windows,
        rejected_signals,
        confirmation_rate_pct,
        execution_rate_pct,
        data_span_days,
        signals_per_day: per_day(counters.total_signals),
        confirmed_per_day: per_day(counters.confirmed_signals),
        trades_per_day: per_day(counters.executed_trades),
        total_trades,
        winning_trades: winning.len(),
        losing_trades: losing.len(),
        win_rate_pct,
        total_pnl,
        total_return_pct,
        final_capital: totals.final_capital,
        gross_profit,
        gross_loss,
        profit_factor,
        avg_win,
        avg_loss,
        payoff_ratio,
        largest_win,
        largest_loss,
        max_drawdown_pct,
        sharpe_ratio,
        total_fees: trades.iter().map(|t| t.fees).sum(),
        total_slippage: trades.iter().map(|t| t.slippage_cost).sum(),
        total_trade_funding: trades.iter().map(|t| t.funding_cost).sum(),
        total_account_funding: totals.account_funding,
    }
}

fn ratio_pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().copied().mean()
    }
}

/// Largest peak-to-trough decline of the capital curve, in percent.
/// The curve starts from `initial_capital`.
fn calculate_max_drawdown(initial_capital: f64, equity_curve: &[EquityPoint]) -> f64 {
    let mut peak = initial_capital;
    let mut max_dd_pct = 0.0f64;

    for point in equity_curve {
        if point.capital > peak {
            peak = point.capital;
        }
        if peak > 0.0 {
            max_dd_pct = max_dd_pct.max((peak - point.capital) / peak * 100.0);
        }
    }

    max_dd_pct
}

/// Per-trade Sharpe: mean(returns) / sample std(returns). Zero with fewer than
/// two trades or no dispersion.
fn calculate_sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().copied().mean();
    let std_dev = returns.iter().copied().std_dev();
    if !std_dev.is_finite() || std_dev == 0.0 {
        return 0.0;
    }
    mean / std_dev
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trade::{ExitReason, TradeDirection, TradeStatus};

    fn closed(pnl: f64) -> Trade {
        Trade {
            id: format!("t{}", pnl),
            direction: TradeDirection::Long,
            timeframe: "5m".into(),
            entry_price: 100.0,
            entry_time: 0,
            size: 1000.0,
            leverage: 1.0,
            take_profit_price: 101.0,
            stop_loss_price: 99.0,
            status: TradeStatus::Closed,
            exit_price: Some(100.0),
            exit_time: Some(60_000),
            exit_reason: Some(ExitReason::TakeProfit),
            pnl,
            pnl_pct: pnl / 10.0,
            best_price: 100.0,
            trailing_take_profit_active: false,
            trailing_take_profit_price: None,
            original_take_profit_price: 101.0,
            trailing_stop_loss_active: false,
            trailing_stop_loss_price: None,
            original_stop_loss_price: 99.0,
            signal_price: 100.0,
            entry_slippage: 0.0,
            fees: 1.0,
            slippage_cost: 0.5,
            funding_cost: 0.0,
        }
    }

    fn totals(final_capital: f64) -> RunTotals {
        RunTotals {
            initial_capital: 1000.0,
            final_capital,
            data_span_ms: 2 * 24 * 60 * 60 * 1000,
            account_funding: 0.0,
        }
    }

    #[test]
    fn test_empty_run() {
        let summary = calculate_summary(&[], &[], &SignalCounters::default(), totals(1000.0));
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.win_rate_pct, 0.0);
        assert_eq!(summary.confirmation_rate_pct, 0.0);
        assert_eq!(summary.execution_rate_pct, 0.0);
        assert_eq!(summary.sharpe_ratio, 0.0);
        assert_eq!(summary.total_return_pct, 0.0);
        assert_eq!(summary.final_capital, 1000.0);
    }

    #[test]
    fn test_rates_and_frequency() {
        let counters = SignalCounters {
            total_signals: 10,
            confirmed_signals: 4,
            executed_trades: 2,
            rejected_by_capacity: 1,
            rejected_by_direction: 1,
            ..Default::default()
        };
        let trades = [closed(10.0), closed(-5.0)];
        let summary = calculate_summary(&trades, &[], &counters, totals(1005.0));
        assert!((summary.confirmation_rate_pct - 40.0).abs() < 1e-9);
        assert!((summary.execution_rate_pct - 50.0).abs() < 1e-9);
        assert!((summary.signals_per_day - 5.0).abs() < 1e-9);
        assert!((summary.trades_per_day - 1.0).abs() < 1e-9);
        assert_eq!(summary.rejected_signals, 2);
        assert!((summary.data_span_days - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_pnl_statistics() {
        let trades = [closed(30.0), closed(-10.0), closed(10.0), closed(-20.0)];
        let summary = calculate_summary(&trades, &[], &SignalCounters::default(), totals(1010.0));
        assert_eq!(summary.winning_trades, 2);
        assert_eq!(summary.losing_trades, 2);
        assert!((summary.win_rate_pct - 50.0).abs() < 1e-9);
        assert!((summary.total_pnl - 10.0).abs() < 1e-9);
        assert!((summary.total_return_pct - 1.0).abs() < 1e-9);
        assert!((summary.profit_factor - 40.0 / 30.0).abs() < 1e-9);
        assert!((summary.avg_win - 20.0).abs() < 1e-9);
        assert!((summary.avg_loss + 15.0).abs() < 1e-9);
        assert!((summary.payoff_ratio - 20.0 / 15.0).abs() < 1e-9);
        assert_eq!(summary.largest_win, 30.0);
        assert_eq!(summary.largest_loss, -20.0);
        assert!((summary.total_fees - 4.0).abs() < 1e-9);
        assert!((summary.total_slippage - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_payoff_ratio_without_losses_uses_epsilon() {
        let counters = SignalCounters::default();
        let summary = calculate_summary(&[closed(5.0)], &[], &counters, totals(1005.0));
        assert!(summary.payoff_ratio.is_finite());
        assert!(summary.payoff_ratio > 1e6);
        assert_eq!(summary.profit_factor, f64::INFINITY);
    }

    #[test]
    fn test_breakeven_counts_as_loss() {
        let trades = [closed(10.0), closed(0.0)];
        let summary = calculate_summary(&trades, &[], &SignalCounters::default(), totals(1010.0));
        assert_eq!(summary.winning_trades, 1);
        assert_eq!(summary.losing_trades, 1);
        assert!((summary.win_rate_pct - 50.0).abs() < 1e-9);
        assert_eq!(summary.gross_loss, 0.0);
        assert_eq!(summary.largest_loss, 0.0);
    }

    #[test]
    fn test_max_drawdown() {
        let curve = vec![
            EquityPoint { time: 1, capital: 1100.0 },
            EquityPoint { time: 2, capital: 880.0 },
            EquityPoint { time: 3, capital: 1200.0 },
            EquityPoint { time: 4, capital: 1080.0 },
        ];
        assert!((calculate_max_drawdown(1000.0, &curve) - 20.0).abs() < 1e-9);
        assert_eq!(calculate_max_drawdown(1000.0, &[]), 0.0);
    }

    #[test]
    fn test_sharpe() {
        assert_eq!(calculate_sharpe(&[0.01]), 0.0);
        assert_eq!(calculate_sharpe(&[0.01, 0.01]), 0.0);
        // mean 0.02, sample std 0.01
        let sharpe = calculate_sharpe(&[0.01, 0.02, 0.03]);
        assert!((sharpe - 2.0).abs() < 1e-9);
    }
}
