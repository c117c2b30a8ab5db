use chrono::Weekday;
use serde::{Deserialize, Serialize};

use super::config::Timeframe;
use super::trade::TradeDirection;
use crate::errors::AppError;

// ── Modes ──

/// Whether primary pivots need cascade confirmation before a trade opens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    #[default]
    Cascade,
    /// Trade every primary pivot directly at its own price and time.
    Pivot,
}

/// Which candle fields pivot detection compares.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    #[default]
    Close,
    #[serde(alias = "highlow", alias = "high-low")]
    HighLow,
}

// ── Timeframes ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeframeRole {
    Primary,
    #[default]
    Secondary,
}

/// Per-timeframe pivot rules and confirmation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeframeConfig {
    pub interval: Timeframe,
    #[serde(default)]
    pub role: TimeframeRole,
    pub lookback: usize,
    #[serde(default)]
    pub min_swing_pct: f64,
    #[serde(default)]
    pub min_leg_bars: usize,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Confirm with the opposite signal of the primary pivot.
    #[serde(default)]
    pub opposite: bool,
    /// Role carried by this timeframe's confirmations. Defaults to `role`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_role: Option<TimeframeRole>,
    /// Bound on the cascade window when this is the primary timeframe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_window_minutes: Option<u32>,
}

fn default_weight() -> f64 {
    1.0
}

impl TimeframeConfig {
    pub fn new(interval: &str, role: TimeframeRole, lookback: usize) -> Result<Self, AppError> {
        Ok(TimeframeConfig {
            interval: interval.parse()?,
            role,
            lookback,
            min_swing_pct: 0.0,
            min_leg_bars: 0,
            weight: default_weight(),
            opposite: false,
            confirmation_role: None,
            confirmation_window_minutes: None,
        })
    }

    pub fn is_primary(&self) -> bool {
        self.role == TimeframeRole::Primary
    }

    pub fn effective_confirmation_role(&self) -> TimeframeRole {
        self.confirmation_role.unwrap_or(self.role)
    }
}

// ── Cascade ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CascadeSettings {
    /// Confirmations needed, the primary pivot's own included.
    #[serde(default = "default_min_timeframes")]
    pub min_timeframes_required: usize,
    #[serde(default)]
    pub require_primary_timeframe: bool,
}

fn default_min_timeframes() -> usize {
    2
}

impl Default for CascadeSettings {
    fn default() -> Self {
        CascadeSettings {
            min_timeframes_required: default_min_timeframes(),
            require_primary_timeframe: false,
        }
    }
}

// ── Position Sizing ──

/// Position sizing mode. Unrecognised names fall back to the fixed amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SizingMode {
    Fixed,
    Percent,
    /// Percent of capital with a floor at `minimum_trade_amount`.
    Minimum,
    Unknown(String),
}

impl From<String> for SizingMode {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "fixed" => SizingMode::Fixed,
            "percent" => SizingMode::Percent,
            "minimum" => SizingMode::Minimum,
            _ => SizingMode::Unknown(s),
        }
    }
}

impl From<SizingMode> for String {
    fn from(mode: SizingMode) -> Self {
        match mode {
            SizingMode::Fixed => "fixed".into(),
            SizingMode::Percent => "percent".into(),
            SizingMode::Minimum => "minimum".into(),
            SizingMode::Unknown(s) => s,
        }
    }
}

impl Default for SizingMode {
    fn default() -> Self {
        SizingMode::Percent
    }
}

// ── Direction Policy ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DirectionPolicy {
    #[default]
    Both,
    /// Longs only.
    #[serde(alias = "long")]
    Buy,
    /// Shorts only.
    #[serde(alias = "short")]
    Sell,
    /// Invert every signal.
    Alternate,
}

impl DirectionPolicy {
    /// Map a pivot signal to the direction to trade, or `None` if rejected.
    pub fn apply(self, signal: TradeDirection) -> Option<TradeDirection> {
        match (self, signal) {
            (DirectionPolicy::Both, s) => Some(s),
            (DirectionPolicy::Buy, TradeDirection::Long) => Some(TradeDirection::Long),
            (DirectionPolicy::Sell, TradeDirection::Short) => Some(TradeDirection::Short),
            (DirectionPolicy::Alternate, s) => Some(s.opposite()),
            _ => None,
        }
    }
}

// ── Trade Config ──

/// Trade execution and cost settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TradeConfig {
    pub initial_capital: f64,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    #[serde(default = "default_leverage")]
    pub leverage: f64,

    #[serde(default)]
    pub position_sizing_mode: SizingMode,
    #[serde(default = "default_amount")]
    pub amount_per_trade: f64,
    #[serde(default = "default_risk_pct")]
    pub risk_per_trade_pct: f64,
    #[serde(default = "default_amount")]
    pub minimum_trade_amount: f64,

    /// Fee per side, in percent of position size.
    #[serde(default = "default_fee_pct")]
    pub maker_fee_pct: f64,
    #[serde(default)]
    pub simulate_slippage: bool,
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: f64,
    #[serde(default)]
    pub simulate_funding: bool,
    /// Funding charged per interval, in percent of position size.
    #[serde(default = "default_funding_rate_pct")]
    pub funding_rate_pct: f64,
    #[serde(default = "default_funding_interval_hours")]
    pub funding_interval_hours: u32,

    #[serde(default)]
    pub entry_delay_minutes: u32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_trades: usize,
    #[serde(default)]
    pub single_trade_mode: bool,
    #[serde(default)]
    pub direction: DirectionPolicy,

    #[serde(default)]
    pub trailing_stop_loss: bool,
    /// Trailing distance; defaults to `stop_loss_pct`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing_stop_loss_pct: Option<f64>,
    #[serde(default)]
    pub trailing_take_profit: bool,
    #[serde(default = "default_trailing_tp_pct")]
    pub trailing_take_profit_pct: f64,

    /// Weekday tokens: Su M T W Th F Sa.
    #[serde(default)]
    pub no_trade_days: Vec<String>,
}

fn default_leverage() -> f64 {
    1.0
}
fn default_amount() -> f64 {
    100.0
}
fn default_risk_pct() -> f64 {
    100.0
}
fn default_fee_pct() -> f64 {
    0.1
}
fn default_slippage_pct() -> f64 {
    0.02
}
fn default_funding_rate_pct() -> f64 {
    0.01
}
fn default_funding_interval_hours() -> u32 {
    8
}
fn default_max_concurrent() -> usize {
    1
}
fn default_trailing_tp_pct() -> f64 {
    0.1
}

impl TradeConfig {
    /// A config with the given capital and TP/SL, every other field at its default.
    pub fn new(initial_capital: f64, take_profit_pct: f64, stop_loss_pct: f64) -> Self {
        TradeConfig {
            initial_capital,
            take_profit_pct,
            stop_loss_pct,
            leverage: default_leverage(),
            position_sizing_mode: SizingMode::default(),
            amount_per_trade: default_amount(),
            risk_per_trade_pct: default_risk_pct(),
            minimum_trade_amount: default_amount(),
            maker_fee_pct: default_fee_pct(),
            simulate_slippage: false,
            slippage_pct: default_slippage_pct(),
            simulate_funding: false,
            funding_rate_pct: default_funding_rate_pct(),
            funding_interval_hours: default_funding_interval_hours(),
            entry_delay_minutes: 0,
            max_concurrent_trades: default_max_concurrent(),
            single_trade_mode: false,
            direction: DirectionPolicy::default(),
            trailing_stop_loss: false,
            trailing_stop_loss_pct: None,
            trailing_take_profit: false,
            trailing_take_profit_pct: default_trailing_tp_pct(),
            no_trade_days: Vec::new(),
        }
    }

    pub fn max_open_trades(&self) -> usize {
        if self.single_trade_mode {
            1
        } else {
            self.max_concurrent_trades
        }
    }

    pub fn funding_interval_ms(&self) -> i64 {
        self.funding_interval_hours as i64 * 60 * 60 * 1000
    }

    pub fn no_trade_weekdays(&self) -> Result<Vec<Weekday>, AppError> {
        self.no_trade_days
            .iter()
            .map(|token| {
                parse_weekday_token(token).ok_or_else(|| {
                    AppError::InvalidConfiguration(format!("unknown no-trade day '{}'", token))
                })
            })
            .collect()
    }

    fn validate(&self) -> Result<(), AppError> {
        let positive = [
            ("initial_capital", self.initial_capital),
            ("take_profit_pct", self.take_profit_pct),
            ("stop_loss_pct", self.stop_loss_pct),
            ("leverage", self.leverage),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!("{} must be positive, got {}", name, value)));
            }
        }

        let non_negative = [
            ("amount_per_trade", self.amount_per_trade),
            ("risk_per_trade_pct", self.risk_per_trade_pct),
            ("minimum_trade_amount", self.minimum_trade_amount),
            ("maker_fee_pct", self.maker_fee_pct),
            ("slippage_pct", self.slippage_pct),
            ("funding_rate_pct", self.funding_rate_pct),
            ("trailing_take_profit_pct", self.trailing_take_profit_pct),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(format!("{} must not be negative, got {}", name, value)));
            }
        }

        if let Some(pct) = self.trailing_stop_loss_pct {
            if !(pct.is_finite() && pct > 0.0) {
                return Err(invalid(format!(
                    "trailing_stop_loss_pct must be positive, got {}",
                    pct
                )));
            }
        }
        if self.funding_interval_hours == 0 {
            return Err(invalid("funding_interval_hours must be at least 1".into()));
        }
        if self.max_concurrent_trades == 0 {
            return Err(invalid("max_concurrent_trades must be at least 1".into()));
        }
        self.no_trade_weekdays()?;
        Ok(())
    }
}

/// Parse the short weekday tokens used by `no_trade_days`.
pub fn parse_weekday_token(token: &str) -> Option<Weekday> {
    match token.trim() {
        "Su" => Some(Weekday::Sun),
        "M" => Some(Weekday::Mon),
        "T" => Some(Weekday::Tue),
        "W" => Some(Weekday::Wed),
        "Th" => Some(Weekday::Thu),
        "F" => Some(Weekday::Fri),
        "Sa" => Some(Weekday::Sat),
        _ => None,
    }
}

fn invalid(message: String) -> AppError {
    AppError::InvalidConfiguration(message)
}

// ── Backtest Config ──

/// Configuration for a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BacktestConfig {
    #[serde(default)]
    pub trading_mode: TradingMode,
    #[serde(default)]
    pub pivot_detection_mode: DetectionMode,
    pub timeframes: Vec<TimeframeConfig>,
    #[serde(default)]
    pub cascade: CascadeSettings,
    pub trade: TradeConfig,
}

impl BacktestConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        let config: BacktestConfig =
            serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The single timeframe that originates signals.
    pub fn primary_timeframe(&self) -> Result<&TimeframeConfig, AppError> {
        self.timeframes
            .iter()
            .find(|tf| tf.is_primary())
            .ok_or(AppError::MissingPrimaryTimeframe)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.timeframes.is_empty() {
            return Err(invalid("at least one timeframe is required".into()));
        }

        let primaries = self.timeframes.iter().filter(|tf| tf.is_primary()).count();
        if primaries == 0 {
            return Err(AppError::MissingPrimaryTimeframe);
        }
        if primaries > 1 {
            return Err(invalid(format!(
                "exactly one primary timeframe is allowed, found {}",
                primaries
            )));
        }

        for (i, tf) in self.timeframes.iter().enumerate() {
            // "60m" and "1h" are the same interval.
            if self.timeframes[..i]
                .iter()
                .any(|other| other.interval.minutes() == tf.interval.minutes())
            {
                return Err(invalid(format!("duplicate timeframe '{}'", tf.interval)));
            }
            if !(tf.min_swing_pct.is_finite() && tf.min_swing_pct >= 0.0) {
                return Err(invalid(format!(
                    "{}: min_swing_pct must not be negative",
                    tf.interval
                )));
            }
            if !(tf.weight.is_finite() && tf.weight >= 0.0) {
                return Err(invalid(format!("{}: weight must not be negative", tf.interval)));
            }
            if tf.confirmation_window_minutes == Some(0) {
                return Err(invalid(format!(
                    "{}: confirmation_window_minutes must be at least 1",
                    tf.interval
                )));
            }
        }

        if self.cascade.min_timeframes_required == 0 {
            return Err(invalid("min_timeframes_required must be at least 1".into()));
        }

        self.trade.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "timeframes": [
            {"interval": "15m", "role": "primary", "lookback": 2, "confirmation_window_minutes": 3},
            {"interval": "1m", "lookback": 1, "opposite": true}
        ],
        "trade": {"initial_capital": 1000, "take_profit_pct": 1.5, "stop_loss_pct": 0.5}
    }"#;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config = BacktestConfig::from_json_str(MINIMAL).unwrap();
        assert_eq!(config.trading_mode, TradingMode::Cascade);
        assert_eq!(config.pivot_detection_mode, DetectionMode::Close);
        assert_eq!(config.cascade.min_timeframes_required, 2);
        assert_eq!(config.trade.leverage, 1.0);
        assert_eq!(config.trade.position_sizing_mode, SizingMode::Percent);
        assert_eq!(config.trade.funding_interval_hours, 8);

        let primary = config.primary_timeframe().unwrap();
        assert_eq!(primary.interval.minutes(), 15);
        assert_eq!(primary.confirmation_window_minutes, Some(3));
        assert_eq!(config.timeframes[1].role, TimeframeRole::Secondary);
        assert!(config.timeframes[1].opposite);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let json = MINIMAL.replace("\"lookback\": 2", "\"lookback\": 2, \"lookbak\": 3");
        assert!(matches!(
            BacktestConfig::from_json_str(&json),
            Err(AppError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_missing_required_key_rejected() {
        let json = MINIMAL.replace("\"initial_capital\": 1000, ", "");
        let err = BacktestConfig::from_json_str(&json).unwrap_err();
        assert!(err.to_string().contains("initial_capital"));
    }

    #[test]
    fn test_invalid_timeframe_string_rejected() {
        let json = MINIMAL.replace("\"15m\"", "\"15x\"");
        assert!(BacktestConfig::from_json_str(&json).is_err());
    }

    #[test]
    fn test_equivalent_intervals_rejected_as_duplicates() {
        let json = MINIMAL
            .replace("\"15m\"", "\"1h\"")
            .replace("\"1m\"", "\"60m\"");
        match BacktestConfig::from_json_str(&json) {
            Err(AppError::InvalidConfiguration(message)) => assert!(message.contains("duplicate")),
            other => panic!("expected InvalidConfiguration, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_primary() {
        let json = MINIMAL.replace("\"role\": \"primary\", ", "");
        assert!(matches!(
            BacktestConfig::from_json_str(&json),
            Err(AppError::MissingPrimaryTimeframe)
        ));
    }

    #[test]
    fn test_negative_size_rejected() {
        let json = MINIMAL.replace(
            "\"stop_loss_pct\": 0.5",
            "\"stop_loss_pct\": 0.5, \"amount_per_trade\": -10",
        );
        assert!(matches!(
            BacktestConfig::from_json_str(&json),
            Err(AppError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_unknown_sizing_mode_kept_as_unknown() {
        let json = MINIMAL.replace(
            "\"stop_loss_pct\": 0.5",
            "\"stop_loss_pct\": 0.5, \"position_sizing_mode\": \"kelly\"",
        );
        let config = BacktestConfig::from_json_str(&json).unwrap();
        assert_eq!(
            config.trade.position_sizing_mode,
            SizingMode::Unknown("kelly".into())
        );
    }

    #[test]
    fn test_no_trade_days() {
        let mut trade = TradeConfig::new(1000.0, 1.0, 1.0);
        trade.no_trade_days = vec!["Sa".into(), "Su".into()];
        assert_eq!(
            trade.no_trade_weekdays().unwrap(),
            vec![Weekday::Sat, Weekday::Sun]
        );
        trade.no_trade_days.push("Funday".into());
        assert!(trade.validate().is_err());
    }

    #[test]
    fn test_direction_policy() {
        use TradeDirection::*;
        assert_eq!(DirectionPolicy::Both.apply(Long), Some(Long));
        assert_eq!(DirectionPolicy::Buy.apply(Short), None);
        assert_eq!(DirectionPolicy::Sell.apply(Short), Some(Short));
        assert_eq!(DirectionPolicy::Alternate.apply(Long), Some(Short));
        assert_eq!(DirectionPolicy::Alternate.apply(Short), Some(Long));
    }

    #[test]
    fn test_max_open_trades() {
        let mut trade = TradeConfig::new(1000.0, 1.0, 1.0);
        trade.max_concurrent_trades = 4;
        assert_eq!(trade.max_open_trades(), 4);
        trade.single_trade_mode = true;
        assert_eq!(trade.max_open_trades(), 1);
    }
}
