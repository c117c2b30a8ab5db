use std::path::Path;

use crate::errors::AppError;
use crate::models::result::{BacktestResults, BacktestSummary};
use crate::models::trade::Trade;

fn opt_f64(value: Option<f64>, decimals: usize) -> String {
    value.map(|v| format!("{:.*}", decimals, v)).unwrap_or_default()
}

/// Write the trade ledger to a CSV file.
pub fn write_trades_csv(trades: &[Trade], path: &Path) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| AppError::FileWrite(format!("Cannot create CSV: {}", e)))?;

    wtr.write_record([
        "Id",
        "Timeframe",
        "Direction",
        "Entry Time",
        "Entry Price",
        "Signal Price",
        "Exit Time",
        "Exit Price",
        "Size",
        "Leverage",
        "Take Profit",
        "Stop Loss",
        "Exit Reason",
        "P&L",
        "P&L %",
        "Fees",
        "Slippage",
        "Funding",
    ])
    .map_err(|e| AppError::FileWrite(e.to_string()))?;

    for t in trades {
        wtr.write_record([
            t.id.as_str(),
            t.timeframe.as_str(),
            &format!("{:?}", t.direction),
            &t.entry_time.to_string(),
            &format!("{:.6}", t.entry_price),
            &format!("{:.6}", t.signal_price),
            &t.exit_time.map(|v| v.to_string()).unwrap_or_default(),
            &opt_f64(t.exit_price, 6),
            &format!("{:.2}", t.size),
            &format!("{:.1}", t.leverage),
            &format!("{:.6}", t.original_take_profit_price),
            &format!("{:.6}", t.original_stop_loss_price),
            t.exit_reason.map(|r| r.short_code()).unwrap_or(""),
            &format!("{:.2}", t.pnl),
            &format!("{:.2}", t.pnl_pct),
            &format!("{:.4}", t.fees),
            &format!("{:.4}", t.slippage_cost),
            &format!("{:.4}", t.funding_cost),
        ])
        .map_err(|e| AppError::FileWrite(e.to_string()))?;
    }

    wtr.flush().map_err(|e| AppError::FileWrite(e.to_string()))?;
    Ok(())
}

/// Write the run summary as a key-value CSV report.
pub fn write_summary_csv(summary: &BacktestSummary, path: &Path) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| AppError::FileWrite(format!("Cannot create CSV: {}", e)))?;

    wtr.write_record(["Metric", "Value"])
        .map_err(|e| AppError::FileWrite(e.to_string()))?;

    let s = summary;
    let rows: Vec<(&str, String)> = vec![
        // Signals
        ("Total Signals", s.total_signals.to_string()),
        ("Confirmed Signals", s.confirmed_signals.to_string()),
        ("Executed Trades", s.executed_trades.to_string()),
        ("Expired Windows", s.expired_windows.to_string()),
        ("Rejected Signals", s.rejected_signals.to_string()),
        ("Confirmation Rate %", format!("{:.2}", s.confirmation_rate_pct)),
        ("Execution Rate %", format!("{:.2}", s.execution_rate_pct)),
        // Frequency
        ("Data Span (days)", format!("{:.2}", s.data_span_days)),
        ("Signals per Day", format!("{:.2}", s.signals_per_day)),
        ("Confirmed per Day", format!("{:.2}", s.confirmed_per_day)),
        ("Trades per Day", format!("{:.2}", s.trades_per_day)),
        // Trades
        ("Total Trades", s.total_trades.to_string()),
        ("Winning Trades", s.winning_trades.to_string()),
        ("Losing Trades", s.losing_trades.to_string()),
        ("Win Rate %", format!("{:.2}", s.win_rate_pct)),
        // P&L
        ("Total P&L", format!("{:.2}", s.total_pnl)),
        ("Total Return %", format!("{:.2}", s.total_return_pct)),
        ("Final Capital", format!("{:.2}", s.final_capital)),
        ("Gross Profit", format!("{:.2}", s.gross_profit)),
        ("Gross Loss", format!("{:.2}", s.gross_loss)),
        ("Profit Factor", format!("{:.2}", s.profit_factor)),
        ("Avg Win", format!("{:.2}", s.avg_win)),
        ("Avg Loss", format!("{:.2}", s.avg_loss)),
        ("Payoff Ratio", format!("{:.2}", s.payoff_ratio)),
        ("Largest Win", format!("{:.2}", s.largest_win)),
        ("Largest Loss", format!("{:.2}", s.largest_loss)),
        // Risk
        ("Max Drawdown %", format!("{:.2}", s.max_drawdown_pct)),
        ("Sharpe Ratio", format!("{:.2}", s.sharpe_ratio)),
        // Costs
        ("Total Fees", format!("{:.2}", s.total_fees)),
        ("Total Slippage", format!("{:.2}", s.total_slippage)),
        ("Trade Funding", format!("{:.2}", s.total_trade_funding)),
        ("Account Funding", format!("{:.2}", s.total_account_funding)),
    ];

    for (name, value) in &rows {
        wtr.write_record([*name, value.as_str()])
            .map_err(|e| AppError::FileWrite(e.to_string()))?;
    }

    wtr.flush().map_err(|e| AppError::FileWrite(e.to_string()))?;
    Ok(())
}

/// Write the full results (ledger, capital curve, summary) as pretty JSON.
pub fn write_results_json(results: &BacktestResults, path: &Path) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json).map_err(|e| AppError::FileWrite(format!("Cannot write JSON: {}", e)))
}
