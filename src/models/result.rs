use serde::{Deserialize, Serialize};

use super::trade::Trade;

/// A point on the capital curve, recorded whenever capital changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: i64,
    pub capital: f64,
}

/// Counters gathered by the orchestrator while the run progresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalCounters {
    /// Primary-timeframe pivots seen.
    pub total_signals: usize,
    /// Windows that reached execution (confirmed and priced).
    pub confirmed_signals: usize,
    /// Trades actually opened.
    pub executed_trades: usize,
    pub expired_windows: usize,
    pub rejected_by_direction: usize,
    pub rejected_by_capacity: usize,
    pub rejected_no_trade_day: usize,
}

/// Summary statistics for a backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSummary {
    // Signals
    pub total_signals: usize,
    pub confirmed_signals: usize,
    pub executed_trades: usize,
    pub expired_windows: usize,
    pub rejected_signals: usize,
    pub confirmation_rate_pct: f64,
    pub execution_rate_pct: f64,

    // Frequency
    pub data_span_days: f64,
    pub signals_per_day: f64,
    pub confirmed_per_day: f64,
    pub trades_per_day: f64,

    // Trades
    pub total_trades: usize,
    pub winning_trades: usize,
    /// Trades with `pnl <= 0`; breakeven trades count here.
    pub losing_trades: usize,
    pub win_rate_pct: f64,

    // P&L
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub final_capital: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub payoff_ratio: f64,
    pub largest_win: f64,
    pub largest_loss: f64,

    // Risk
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,

    // Costs
    pub total_fees: f64,
    pub total_slippage: f64,
    pub total_trade_funding: f64,
    /// Funding charged against capital at interval boundaries.
    pub total_account_funding: f64,
}

/// Complete results of a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResults {
    /// Closed trades in the order they closed.
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub summary: BacktestSummary,
}
