use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use cascade_backtester::data::loader::{load_candles_csv, load_config};
use cascade_backtester::engine::executor::run_backtest;
use cascade_backtester::init_tracing;
use cascade_backtester::models::result::BacktestSummary;
use cascade_backtester::utils::export::{write_results_json, write_summary_csv, write_trades_csv};

#[derive(Parser)]
#[command(
    name = "cascade-backtester",
    about = "Multi-timeframe pivot cascade backtester"
)]
struct Cli {
    /// Base-resolution OHLCV CSV (time ms, open, high, low, close, volume).
    #[arg(long)]
    candles: PathBuf,

    /// JSON backtest configuration.
    #[arg(long)]
    config: PathBuf,

    /// Only use the last N candles of the file.
    #[arg(long)]
    max_candles: Option<usize>,

    /// Write the trade ledger as CSV.
    #[arg(long)]
    trades_out: Option<PathBuf>,

    /// Write the summary as key-value CSV.
    #[arg(long)]
    summary_out: Option<PathBuf>,

    /// Write full results as JSON.
    #[arg(long)]
    json_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let candles = load_candles_csv(&cli.candles, cli.max_candles)
        .with_context(|| format!("loading candles {}", cli.candles.display()))?;

    let results = run_backtest(&candles, &config, |pct, i, total| {
        debug!("Progress {}% ({}/{})", pct, i, total);
    })?;

    print_summary(&results.summary);

    if let Some(path) = &cli.trades_out {
        write_trades_csv(&results.trades, path)?;
        info!("Trades written to {}", path.display());
    }
    if let Some(path) = &cli.summary_out {
        write_summary_csv(&results.summary, path)?;
        info!("Summary written to {}", path.display());
    }
    if let Some(path) = &cli.json_out {
        write_results_json(&results, path)?;
        info!("Results written to {}", path.display());
    }

    Ok(())
}

fn print_summary(s: &BacktestSummary) {
    info!(
        "Signals: {} total, {} confirmed ({:.1}%), {} executed ({:.1}%), {} expired",
        s.total_signals,
        s.confirmed_signals,
        s.confirmation_rate_pct,
        s.executed_trades,
        s.execution_rate_pct,
        s.expired_windows
    );
    info!(
        "Frequency over {:.1} days: {:.2} signals/day, {:.2} confirmed/day, {:.2} trades/day",
        s.data_span_days, s.signals_per_day, s.confirmed_per_day, s.trades_per_day
    );
    info!(
        "Trades: {} ({} won, {} lost), win rate {:.1}%",
        s.total_trades, s.winning_trades, s.losing_trades, s.win_rate_pct
    );
    info!(
        "Capital: {:.2} final, {:+.2}% return, max drawdown {:.2}%, sharpe {:.2}",
        s.final_capital, s.total_return_pct, s.max_drawdown_pct, s.sharpe_ratio
    );
    info!(
        "Costs: fees {:.2}, slippage {:.2}, funding {:.2} (trades) + {:.2} (account)",
        s.total_fees, s.total_slippage, s.total_trade_funding, s.total_account_funding
    );
}
