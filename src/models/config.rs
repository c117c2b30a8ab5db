use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub const MS_PER_MINUTE: i64 = 60 * 1000;

/// A parsed candle interval such as `15m`, `4h`, `1d` or `1w`.
///
/// Every call site parses timeframe strings through [`parse_timeframe_minutes`],
/// so the accepted suffixes live in exactly one place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    label: String,
    minutes: u32,
}

impl Timeframe {
    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn interval_ms(&self) -> i64 {
        self.minutes as i64 * MS_PER_MINUTE
    }

    pub fn as_str(&self) -> &str {
        &self.label
    }
}

/// Parse a timeframe string into a minute count.
///
/// Accepted suffixes: `m`, `h`, `d`, `w` (case-insensitive). A bare number is minutes.
pub fn parse_timeframe_minutes(s: &str) -> Result<u32, AppError> {
    let tf = s.trim().to_lowercase();
    let invalid = || AppError::InvalidTimeframe(s.to_string());

    let (digits, multiplier) = match tf.chars().last() {
        Some('m') => (&tf[..tf.len() - 1], 1u32),
        Some('h') => (&tf[..tf.len() - 1], 60),
        Some('d') => (&tf[..tf.len() - 1], 60 * 24),
        Some('w') => (&tf[..tf.len() - 1], 60 * 24 * 7),
        Some(c) if c.is_ascii_digit() => (tf.as_str(), 1),
        _ => return Err(invalid()),
    };

    let count: u32 = digits.parse().map_err(|_| invalid())?;
    if count == 0 {
        return Err(invalid());
    }
    count.checked_mul(multiplier).ok_or_else(invalid)
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

impl std::str::FromStr for Timeframe {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let minutes = parse_timeframe_minutes(s)?;
        Ok(Timeframe {
            label: s.trim().to_string(),
            minutes,
        })
    }
}

impl TryFrom<String> for Timeframe {
    type Error = AppError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.label
    }
}
