use std::fs;
use std::path::Path;

use tracing::info;

use crate::errors::AppError;
use crate::models::candle::Candle;
use crate::models::strategy::BacktestConfig;

/// Load base candles from a CSV file.
///
/// The first row is a header. The first six columns are read positionally as
/// `time (ms), open, high, low, close, volume`; extra columns are ignored.
/// With `max_candles`, only the last N rows are kept. The result is sorted
/// ascending by time.
pub fn load_candles_csv(path: &Path, max_candles: Option<usize>) -> Result<Vec<Candle>, AppError> {
    if !path.exists() {
        return Err(AppError::FileNotFound(path.display().to_string()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut candles = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        // 1-based line number, counting the header
        let row = i + 2;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        candles.push(parse_record(&record, row)?);
    }

    if let Some(max) = max_candles {
        if candles.len() > max {
            candles.drain(..candles.len() - max);
        }
    }
    candles.sort_by_key(|c| c.time);

    info!("Loaded {} candles from {}", candles.len(), path.display());
    Ok(candles)
}

fn parse_record(record: &csv::StringRecord, row: usize) -> Result<Candle, AppError> {
    if record.len() < 6 {
        return Err(AppError::CsvParseError {
            row,
            message: format!("expected 6 columns, found {}", record.len()),
        });
    }

    let number = |idx: usize, name: &str| -> Result<f64, AppError> {
        record[idx].parse::<f64>().map_err(|e| AppError::CsvParseError {
            row,
            message: format!("invalid {} '{}': {}", name, &record[idx], e),
        })
    };

    let time = record[0].parse::<i64>().map_err(|e| AppError::CsvParseError {
        row,
        message: format!("invalid time '{}': {}", &record[0], e),
    })?;

    Ok(Candle {
        time,
        open: number(1, "open")?,
        high: number(2, "high")?,
        low: number(3, "low")?,
        close: number(4, "close")?,
        volume: number(5, "volume")?,
    })
}

/// Load and validate a JSON backtest configuration.
pub fn load_config(path: &Path) -> Result<BacktestConfig, AppError> {
    if !path.exists() {
        return Err(AppError::FileNotFound(path.display().to_string()));
    }
    let json = fs::read_to_string(path)?;
    BacktestConfig::from_json_str(&json)
}
