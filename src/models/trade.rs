use serde::{Deserialize, Serialize};

/// Direction of a position or of a pivot's signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            TradeDirection::Long => 1.0,
            TradeDirection::Short => -1.0,
        }
    }

    pub fn opposite(self) -> TradeDirection {
        match self {
            TradeDirection::Long => TradeDirection::Short,
            TradeDirection::Short => TradeDirection::Long,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeStatus {
    Open,
    Closed,
}

/// Reason a trade was closed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingTakeProfit,
    TrailingStopLoss,
    /// Terminal liquidation at the end of the data.
    EndOfData,
}

impl ExitReason {
    pub fn short_code(self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "TP",
            ExitReason::StopLoss => "SL",
            ExitReason::TrailingTakeProfit => "TTP",
            ExitReason::TrailingStopLoss => "TSL",
            ExitReason::EndOfData => "EOD",
        }
    }
}

/// A simulated position, from entry to exit.
///
/// Only the simulator mutates a trade, and only while it is `Open`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub direction: TradeDirection,
    pub timeframe: String,
    pub entry_price: f64,
    pub entry_time: i64,
    pub size: f64,
    pub leverage: f64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    pub status: TradeStatus,
    pub exit_price: Option<f64>,
    pub exit_time: Option<i64>,
    pub exit_reason: Option<ExitReason>,
    pub pnl: f64,
    pub pnl_pct: f64,

    /// Most favorable close seen since entry.
    pub best_price: f64,

    // Trailing state
    pub trailing_take_profit_active: bool,
    pub trailing_take_profit_price: Option<f64>,
    pub original_take_profit_price: f64,
    pub trailing_stop_loss_active: bool,
    pub trailing_stop_loss_price: Option<f64>,
    pub original_stop_loss_price: f64,

    // Slippage / cost bookkeeping
    /// Price of the pivot that originated the trade.
    pub signal_price: f64,
    /// Resolved entry price minus the signal price.
    pub entry_slippage: f64,
    pub fees: f64,
    pub slippage_cost: f64,
    pub funding_cost: f64,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }
}
