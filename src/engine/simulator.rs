use std::collections::HashSet;

use chrono::{DateTime, Datelike, Weekday};
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::models::candle::Candle;
use crate::models::pivot::Pivot;
use crate::models::result::EquityPoint;
use crate::models::strategy::{SizingMode, TradeConfig};
use crate::models::trade::{ExitReason, Trade, TradeDirection, TradeStatus};

use super::cascade::ExecutionEvent;

/// Calculate the position size for a new trade.
pub fn calculate_trade_size(capital: f64, config: &TradeConfig) -> f64 {
    match &config.position_sizing_mode {
        SizingMode::Fixed => config.amount_per_trade,
        SizingMode::Percent => capital * config.risk_per_trade_pct / 100.0,
        SizingMode::Minimum => {
            let calculated = capital * config.risk_per_trade_pct / 100.0;
            calculated.max(config.minimum_trade_amount)
        }
        SizingMode::Unknown(name) => {
            debug!("Unknown sizing mode '{}', using fixed amount", name);
            config.amount_per_trade
        }
    }
}

/// Take-profit price: `pct` percent beyond entry in the trade's favour.
pub fn calculate_take_profit(entry_price: f64, direction: TradeDirection, pct: f64) -> f64 {
    entry_price + direction.sign() * entry_price * pct / 100.0
}

/// Stop-loss price: `pct` percent against the trade.
pub fn calculate_stop_loss(entry_price: f64, direction: TradeDirection, pct: f64) -> f64 {
    entry_price - direction.sign() * entry_price * pct / 100.0
}

/// Create an open trade from a pivot.
///
/// Entry is at the pivot price unless `entry_price_override` is given. TP and SL
/// derive from the final entry price.
pub fn open_trade(
    direction: TradeDirection,
    pivot: &Pivot,
    size: f64,
    entry_time: i64,
    timeframe: &str,
    entry_price_override: Option<f64>,
    config: &TradeConfig,
) -> Trade {
    let entry_price = entry_price_override.unwrap_or(pivot.price);
    let take_profit_price = calculate_take_profit(entry_price, direction, config.take_profit_pct);
    let stop_loss_price = calculate_stop_loss(entry_price, direction, config.stop_loss_pct);

    Trade {
        id: uuid::Uuid::new_v4().to_string(),
        direction,
        timeframe: timeframe.to_string(),
        entry_price,
        entry_time,
        size,
        leverage: config.leverage,
        take_profit_price,
        stop_loss_price,
        status: TradeStatus::Open,
        exit_price: None,
        exit_time: None,
        exit_reason: None,
        pnl: 0.0,
        pnl_pct: 0.0,
        best_price: entry_price,
        trailing_take_profit_active: false,
        trailing_take_profit_price: None,
        original_take_profit_price: take_profit_price,
        trailing_stop_loss_active: false,
        trailing_stop_loss_price: None,
        original_stop_loss_price: stop_loss_price,
        signal_price: pivot.price,
        entry_slippage: entry_price - pivot.price,
        fees: 0.0,
        slippage_cost: 0.0,
        funding_cost: 0.0,
    }
}

/// Move `current` toward `candidate` only if that is in the trade's favour.
fn ratchet(current: Option<f64>, candidate: f64, direction: TradeDirection) -> f64 {
    match current {
        Some(level) if (candidate - level) * direction.sign() <= 0.0 => level,
        _ => candidate,
    }
}

/// Level `pct` percent behind the best price.
fn trail_level(best_price: f64, direction: TradeDirection, pct: f64) -> f64 {
    best_price - direction.sign() * best_price * pct / 100.0
}

/// Price has reached `level` in the trade's favour (`>=` long, `<=` short).
fn reached(price: f64, level: f64, direction: TradeDirection) -> bool {
    (price - level) * direction.sign() >= 0.0
}

/// Price has fallen back to `level` against the trade (`<=` long, `>=` short).
fn breached(price: f64, level: f64, direction: TradeDirection) -> bool {
    (price - level) * direction.sign() <= 0.0
}

/// Feed one tick to an open trade. Returns true if the trade closed.
///
/// Exits are evaluated on the tick's close price.
pub fn update_trade(trade: &mut Trade, candle: &Candle, config: &TradeConfig) -> bool {
    if !trade.is_open() {
        return false;
    }

    let price = candle.close;
    let direction = trade.direction;

    if (price - trade.best_price) * direction.sign() > 0.0 {
        trade.best_price = price;
    }

    // ── Trailing stop-loss follows the best price once in profit ──
    let in_profit = (trade.best_price - trade.entry_price) * direction.sign() > 0.0;
    if config.trailing_stop_loss && in_profit {
        let pct = config.trailing_stop_loss_pct.unwrap_or(config.stop_loss_pct);
        let candidate = trail_level(trade.best_price, direction, pct);
        trade.trailing_stop_loss_price =
            Some(ratchet(trade.trailing_stop_loss_price, candidate, direction));
        trade.trailing_stop_loss_active = true;
    }

    // ── Take profit ──
    if trade.trailing_take_profit_active {
        let candidate = trail_level(trade.best_price, direction, config.trailing_take_profit_pct);
        let level = ratchet(trade.trailing_take_profit_price, candidate, direction);
        trade.trailing_take_profit_price = Some(level);
        if breached(price, level, direction) {
            close_trade(trade, price, candle.time, ExitReason::TrailingTakeProfit, config);
            return true;
        }
    } else if reached(price, trade.take_profit_price, direction) {
        if config.trailing_take_profit {
            let level = trail_level(trade.best_price, direction, config.trailing_take_profit_pct);
            trade.trailing_take_profit_price = Some(level);
            trade.trailing_take_profit_active = true;
            debug!("Trade {} trailing TP armed at {:.4}", trade.id, level);
        } else {
            close_trade(trade, price, candle.time, ExitReason::TakeProfit, config);
            return true;
        }
    }

    // ── Stop loss (trailing level wins when more favourable) ──
    let (stop, reason) = match trade.trailing_stop_loss_price {
        Some(trailing) if (trailing - trade.stop_loss_price) * direction.sign() > 0.0 => {
            (trailing, ExitReason::TrailingStopLoss)
        }
        _ => (trade.stop_loss_price, ExitReason::StopLoss),
    };
    if breached(price, stop, direction) {
        close_trade(trade, price, candle.time, reason, config);
        return true;
    }

    false
}

/// Liquidate an open trade at `candle`'s close regardless of TP/SL.
pub fn force_close(trade: &mut Trade, candle: &Candle, config: &TradeConfig) {
    close_trade(trade, candle.close, candle.time, ExitReason::EndOfData, config);
}

/// Fix the exit and compute realised P&L. A closed trade is never recomputed.
fn close_trade(
    trade: &mut Trade,
    exit_price: f64,
    exit_time: i64,
    reason: ExitReason,
    config: &TradeConfig,
) {
    if !trade.is_open() {
        return;
    }

    let price_change = trade.direction.sign() * (exit_price - trade.entry_price);
    let gross = price_change / trade.entry_price * trade.size * trade.leverage;

    let fees = trade.size * config.maker_fee_pct / 100.0 * 2.0;
    let slippage_cost = if config.simulate_slippage {
        trade.size * config.slippage_pct / 100.0
    } else {
        0.0
    };
    let funding_cost = if config.simulate_funding {
        let periods = ((exit_time - trade.entry_time) / config.funding_interval_ms()).max(0);
        trade.size * config.funding_rate_pct / 100.0 * periods as f64
    } else {
        0.0
    };

    trade.status = TradeStatus::Closed;
    trade.exit_price = Some(exit_price);
    trade.exit_time = Some(exit_time);
    trade.exit_reason = Some(reason);
    trade.pnl_pct = price_change / trade.entry_price * 100.0 * trade.leverage;
    trade.fees = fees;
    trade.slippage_cost = slippage_cost;
    trade.funding_cost = funding_cost;
    trade.pnl = gross - fees - slippage_cost - funding_cost;
}

/// Charges funding once per interval across all open trades.
#[derive(Debug)]
pub struct FundingLedger {
    enabled: bool,
    interval_ms: i64,
    rate_pct: f64,
    applied: HashSet<i64>,
}

impl FundingLedger {
    pub fn new(config: &TradeConfig) -> Self {
        FundingLedger {
            enabled: config.simulate_funding && config.funding_rate_pct != 0.0,
            interval_ms: config.funding_interval_ms(),
            rate_pct: config.funding_rate_pct,
            applied: HashSet::new(),
        }
    }

    /// Funding owed at `now`, or `None` if nothing is open or this interval was
    /// already charged.
    pub fn charge(&mut self, now: i64, open_trades: &[Trade]) -> Option<f64> {
        if !self.enabled || open_trades.is_empty() {
            return None;
        }
        let key = now.div_euclid(self.interval_ms) * self.interval_ms;
        if !self.applied.insert(key) {
            return None;
        }
        Some(
            open_trades
                .iter()
                .map(|t| t.size * self.rate_pct / 100.0)
                .sum(),
        )
    }
}

/// What the simulator did with an execution event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDecision {
    Opened(String),
    RejectedDirection,
    RejectedCapacity,
    RejectedNoTradeDay,
}

/// Owns open trades, the closed-trade ledger and running capital.
#[derive(Debug)]
pub struct TradeSimulator {
    config: TradeConfig,
    no_trade_days: Vec<Weekday>,
    capital: f64,
    open: Vec<Trade>,
    closed: Vec<Trade>,
    funding: FundingLedger,
    account_funding: f64,
    equity_curve: Vec<EquityPoint>,
}

impl TradeSimulator {
    pub fn new(config: &TradeConfig) -> Result<Self, AppError> {
        Ok(TradeSimulator {
            no_trade_days: config.no_trade_weekdays()?,
            capital: config.initial_capital,
            open: Vec::new(),
            closed: Vec::new(),
            funding: FundingLedger::new(config),
            account_funding: 0.0,
            equity_curve: Vec::new(),
            config: config.clone(),
        })
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn open_trades(&self) -> &[Trade] {
        &self.open
    }

    pub fn account_funding(&self) -> f64 {
        self.account_funding
    }

    /// Deduct funding for the interval containing `now`, at most once per interval.
    pub fn apply_funding(&mut self, now: i64) {
        if let Some(amount) = self.funding.charge(now, &self.open) {
            self.capital -= amount;
            self.account_funding += amount;
            self.equity_curve.push(EquityPoint { time: now, capital: self.capital });
            debug!("Funding applied: -{:.2}, capital {:.2}", amount, self.capital);
        }
    }

    /// Feed a base tick to every started open trade, in opening order.
    /// Returns how many trades closed.
    pub fn update(&mut self, candle: &Candle) -> usize {
        let mut closed_now = 0;
        let mut still_open = Vec::with_capacity(self.open.len());

        for mut trade in self.open.drain(..) {
            if candle.time >= trade.entry_time && update_trade(&mut trade, candle, &self.config) {
                self.capital += trade.pnl;
                self.equity_curve.push(EquityPoint { time: candle.time, capital: self.capital });
                debug!(
                    "[{}] {:?} closed @ {:.4} ({}), PnL {:+.2}",
                    trade.exit_reason.map(|r| r.short_code()).unwrap_or("?"),
                    trade.direction,
                    candle.close,
                    candle.time,
                    trade.pnl
                );
                self.closed.push(trade);
                closed_now += 1;
            } else {
                still_open.push(trade);
            }
        }

        self.open = still_open;
        closed_now
    }

    /// Try to open a trade for a confirmed signal.
    pub fn execute(&mut self, event: &ExecutionEvent, timeframe: &str) -> EntryDecision {
        let Some(direction) = self.config.direction.apply(event.primary_pivot.signal) else {
            return EntryDecision::RejectedDirection;
        };
        if self.open.len() >= self.config.max_open_trades() {
            return EntryDecision::RejectedCapacity;
        }
        if self.is_no_trade_day(event.entry_time) {
            return EntryDecision::RejectedNoTradeDay;
        }

        let size = calculate_trade_size(self.capital, &self.config);
        let trade = open_trade(
            direction,
            &event.primary_pivot,
            size,
            event.entry_time,
            timeframe,
            Some(event.entry_price),
            &self.config,
        );
        debug!(
            "Opened {:?} @ {:.4} size {:.2} TP {:.4} SL {:.4}",
            trade.direction,
            trade.entry_price,
            trade.size,
            trade.take_profit_price,
            trade.stop_loss_price
        );
        let id = trade.id.clone();
        self.open.push(trade);
        EntryDecision::Opened(id)
    }

    /// Force-close everything still open against the final candle.
    pub fn liquidate(&mut self, last: &Candle) {
        if self.open.is_empty() {
            return;
        }
        warn!("Liquidating {} open trades at end of data", self.open.len());
        for mut trade in self.open.drain(..) {
            force_close(&mut trade, last, &self.config);
            self.capital += trade.pnl;
            self.closed.push(trade);
        }
        self.equity_curve.push(EquityPoint { time: last.time, capital: self.capital });
    }

    pub fn into_parts(self) -> (Vec<Trade>, Vec<EquityPoint>, f64) {
        (self.closed, self.equity_curve, self.capital)
    }

    fn is_no_trade_day(&self, time: i64) -> bool {
        if self.no_trade_days.is_empty() {
            return false;
        }
        DateTime::from_timestamp_millis(time)
            .map(|dt| self.no_trade_days.contains(&dt.weekday()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pivot::PivotType;
    use crate::models::strategy::DirectionPolicy;

    const HOUR: i64 = 60 * 60 * 1000;

    fn no_cost_config() -> TradeConfig {
        let mut config = TradeConfig::new(10_000.0, 10.0, 10.0);
        config.maker_fee_pct = 0.0;
        config
    }

    fn pivot(price: f64, signal: TradeDirection) -> Pivot {
        Pivot {
            pivot_type: match signal {
                TradeDirection::Long => PivotType::Low,
                TradeDirection::Short => PivotType::High,
            },
            price,
            time: 0,
            index: 0,
            signal,
            swing_pct: 0.0,
            timeframe: "5m".into(),
        }
    }

    fn open_at(direction: TradeDirection, price: Option<f64>, config: &TradeConfig) -> Trade {
        open_trade(direction, &pivot(100.0, direction), 1000.0, 0, "5m", price, config)
    }

    fn tick(time: i64, close: f64) -> Candle {
        Candle { time, open: close, high: close, low: close, close, volume: 1.0 }
    }

    #[test]
    fn test_tp_sl_levels() {
        assert!((calculate_take_profit(100.0, TradeDirection::Long, 2.0) - 102.0).abs() < 1e-10);
        assert!((calculate_stop_loss(100.0, TradeDirection::Long, 1.0) - 99.0).abs() < 1e-10);
        assert!((calculate_take_profit(100.0, TradeDirection::Short, 2.0) - 98.0).abs() < 1e-10);
        assert!((calculate_stop_loss(100.0, TradeDirection::Short, 1.0) - 101.0).abs() < 1e-10);
    }

    #[test]
    fn test_long_and_short_pnl_sign() {
        let config = no_cost_config();

        let mut long = open_at(TradeDirection::Long, None, &config);
        assert!(update_trade(&mut long, &tick(60_000, 110.0), &config));
        assert_eq!(long.exit_reason, Some(ExitReason::TakeProfit));
        assert!((long.pnl - 100.0).abs() < 1e-9);

        let mut short = open_at(TradeDirection::Short, None, &config);
        assert!(update_trade(&mut short, &tick(60_000, 110.0), &config));
        assert_eq!(short.exit_reason, Some(ExitReason::StopLoss));
        assert!((short.pnl + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_override_price_drives_levels() {
        let config = no_cost_config();
        let trade = open_at(TradeDirection::Long, Some(200.0), &config);
        assert_eq!(trade.entry_price, 200.0);
        assert!((trade.take_profit_price - 220.0).abs() < 1e-9);
        assert!((trade.stop_loss_price - 180.0).abs() < 1e-9);
        assert_eq!(trade.signal_price, 100.0);
        assert_eq!(trade.entry_slippage, 100.0);
        assert_eq!(trade.best_price, 200.0);
        assert_eq!(trade.original_stop_loss_price, trade.stop_loss_price);
    }

    #[test]
    fn test_costs_deducted_once() {
        let mut config = no_cost_config();
        config.maker_fee_pct = 0.1;
        config.simulate_slippage = true;
        config.slippage_pct = 0.05;
        config.simulate_funding = true;
        config.funding_rate_pct = 0.01;

        let mut trade = open_at(TradeDirection::Long, None, &config);
        // Held 17 hours: two full 8h funding periods.
        assert!(update_trade(&mut trade, &tick(17 * HOUR, 110.0), &config));
        let expected = 100.0 - 2.0 - 0.5 - 0.2;
        assert!((trade.pnl - expected).abs() < 1e-9, "pnl {}", trade.pnl);
        assert!((trade.fees - 2.0).abs() < 1e-9);
        assert!((trade.funding_cost - 0.2).abs() < 1e-9);

        // Further ticks never touch a closed trade.
        assert!(!update_trade(&mut trade, &tick(18 * HOUR, 50.0), &config));
        assert!((trade.pnl - expected).abs() < 1e-9);
    }

    #[test]
    fn test_best_price_tracks_favourable_closes() {
        let config = no_cost_config();
        let mut short = open_at(TradeDirection::Short, None, &config);
        for close in [99.0, 97.0, 98.5, 96.5, 99.5] {
            assert!(!update_trade(&mut short, &tick(60_000, close), &config));
        }
        assert_eq!(short.best_price, 96.5);
    }

    #[test]
    fn test_trailing_stop_loss() {
        let mut config = no_cost_config();
        config.trailing_stop_loss = true;
        config.trailing_stop_loss_pct = Some(2.0);
        let mut trade = open_at(TradeDirection::Long, None, &config);

        assert!(!update_trade(&mut trade, &tick(1, 105.0), &config));
        assert!(trade.trailing_stop_loss_active);
        assert!((trade.trailing_stop_loss_price.unwrap() - 102.9).abs() < 1e-9);

        // Lower closes never loosen the trail.
        assert!(!update_trade(&mut trade, &tick(2, 104.0), &config));
        assert!((trade.trailing_stop_loss_price.unwrap() - 102.9).abs() < 1e-9);

        assert!(update_trade(&mut trade, &tick(3, 102.5), &config));
        assert_eq!(trade.exit_reason, Some(ExitReason::TrailingStopLoss));
        assert_eq!(trade.original_stop_loss_price, 90.0);
    }

    #[test]
    fn test_trailing_take_profit() {
        let mut config = no_cost_config();
        config.take_profit_pct = 5.0;
        config.trailing_take_profit = true;
        config.trailing_take_profit_pct = 1.0;
        let mut trade = open_at(TradeDirection::Short, None, &config);

        // Reaching TP arms the trail instead of closing.
        assert!(!update_trade(&mut trade, &tick(1, 95.0), &config));
        assert!(trade.trailing_take_profit_active);
        assert!(!update_trade(&mut trade, &tick(2, 90.0), &config));
        assert!((trade.trailing_take_profit_price.unwrap() - 90.9).abs() < 1e-9);

        assert!(update_trade(&mut trade, &tick(3, 91.0), &config));
        assert_eq!(trade.exit_reason, Some(ExitReason::TrailingTakeProfit));
        assert_eq!(trade.exit_price, Some(91.0));
        assert!((trade.pnl - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_sizing_modes() {
        let mut config = TradeConfig::new(10_000.0, 1.0, 1.0);
        config.amount_per_trade = 250.0;
        config.risk_per_trade_pct = 10.0;
        config.minimum_trade_amount = 2_000.0;

        config.position_sizing_mode = SizingMode::Fixed;
        assert_eq!(calculate_trade_size(10_000.0, &config), 250.0);
        config.position_sizing_mode = SizingMode::Percent;
        assert!((calculate_trade_size(10_000.0, &config) - 1_000.0).abs() < 1e-9);
        config.position_sizing_mode = SizingMode::Minimum;
        assert_eq!(calculate_trade_size(10_000.0, &config), 2_000.0);
        assert!((calculate_trade_size(50_000.0, &config) - 5_000.0).abs() < 1e-9);
        config.position_sizing_mode = SizingMode::Unknown("martingale".into());
        assert_eq!(calculate_trade_size(10_000.0, &config), 250.0);
    }

    #[test]
    fn test_funding_charged_once_per_interval() {
        let mut config = no_cost_config();
        config.simulate_funding = true;
        config.funding_rate_pct = 0.01;
        let mut sim = TradeSimulator::new(&config).unwrap();

        let event = ExecutionEvent::immediate(pivot(100.0, TradeDirection::Long));
        assert!(matches!(sim.execute(&event, "5m"), EntryDecision::Opened(_)));
        let size = sim.open_trades()[0].size;

        for minute in 0..30 {
            sim.apply_funding(8 * HOUR + minute * 60_000);
        }
        assert!((sim.capital() - (10_000.0 - size * 0.0001)).abs() < 1e-9);

        sim.apply_funding(16 * HOUR);
        assert!((sim.account_funding() - 2.0 * size * 0.0001).abs() < 1e-9);
    }

    #[test]
    fn test_funding_skipped_without_open_trades() {
        let mut config = no_cost_config();
        config.simulate_funding = true;
        let mut sim = TradeSimulator::new(&config).unwrap();
        sim.apply_funding(8 * HOUR);
        assert_eq!(sim.capital(), 10_000.0);
    }

    #[test]
    fn test_execute_filters() {
        let mut config = no_cost_config();
        config.direction = DirectionPolicy::Sell;
        let mut sim = TradeSimulator::new(&config).unwrap();
        let long_event = ExecutionEvent::immediate(pivot(100.0, TradeDirection::Long));
        assert_eq!(sim.execute(&long_event, "5m"), EntryDecision::RejectedDirection);

        config.direction = DirectionPolicy::Alternate;
        let mut sim = TradeSimulator::new(&config).unwrap();
        assert!(matches!(sim.execute(&long_event, "5m"), EntryDecision::Opened(_)));
        assert_eq!(sim.open_trades()[0].direction, TradeDirection::Short);
        assert_eq!(sim.execute(&long_event, "5m"), EntryDecision::RejectedCapacity);
    }

    #[test]
    fn test_no_trade_day() {
        let mut config = no_cost_config();
        config.no_trade_days = vec!["Th".into()];
        let mut sim = TradeSimulator::new(&config).unwrap();
        // 1970-01-01 was a Thursday.
        let event = ExecutionEvent::immediate(pivot(100.0, TradeDirection::Long));
        assert_eq!(sim.execute(&event, "5m"), EntryDecision::RejectedNoTradeDay);
    }

    #[test]
    fn test_update_respects_entry_time_and_liquidate() {
        let config = no_cost_config();
        let mut sim = TradeSimulator::new(&config).unwrap();
        let mut event = ExecutionEvent::immediate(pivot(100.0, TradeDirection::Long));
        event.entry_time = 10 * 60_000;
        sim.execute(&event, "5m");

        // Before entry: a TP-level close is ignored.
        assert_eq!(sim.update(&tick(5 * 60_000, 150.0)), 0);
        assert_eq!(sim.update(&tick(11 * 60_000, 104.0)), 0);

        sim.liquidate(&tick(12 * 60_000, 105.0));
        let (closed, curve, capital) = sim.into_parts();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::EndOfData));
        assert!((capital - (10_000.0 + closed[0].pnl)).abs() < 1e-9);
        assert_eq!(curve.last().map(|p| p.time), Some(12 * 60_000));
    }
}
