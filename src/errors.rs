use serde::Serialize;

/// All application errors, categorized by domain.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ── Data / Import ──
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read file: {0}")]
    FileRead(String),

    #[error("Failed to write file: {0}")]
    FileWrite(String),

    #[error("CSV parse error at row {row}: {message}")]
    CsvParseError { row: usize, message: String },

    // ── Timeframes ──
    #[error("Invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("No primary timeframe configured")]
    MissingPrimaryTimeframe,

    // ── Backtest ──
    #[error("Base-resolution candle series is missing or empty")]
    MissingBaseSeries,

    // ── Configuration ──
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ── Serialization ──
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Serializable error response for machine-readable output.
#[derive(Debug, Serialize, Clone)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let code = match err {
            AppError::FileNotFound(_) => "FILE_NOT_FOUND",
            AppError::FileRead(_) => "FILE_READ",
            AppError::FileWrite(_) => "FILE_WRITE",
            AppError::CsvParseError { .. } => "CSV_PARSE_ERROR",
            AppError::InvalidTimeframe(_) => "INVALID_TIMEFRAME",
            AppError::MissingPrimaryTimeframe => "MISSING_PRIMARY_TIMEFRAME",
            AppError::MissingBaseSeries => "MISSING_BASE_SERIES",
            AppError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            AppError::Serialization(_) => "SERIALIZATION",
        };
        ErrorResponse {
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let response = ErrorResponse::from(self);
        response.serialize(serializer)
    }
}

// ── Conversions from external errors ──

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileRead(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        let row = err
            .position()
            .map(|p| p.record() as usize)
            .unwrap_or_default();
        AppError::CsvParseError {
            row,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let resp = ErrorResponse::from(&AppError::MissingPrimaryTimeframe);
        assert_eq!(resp.code, "MISSING_PRIMARY_TIMEFRAME");
        assert_eq!(resp.message, "No primary timeframe configured");

        let resp = ErrorResponse::from(&AppError::InvalidTimeframe("3x".into()));
        assert_eq!(resp.code, "INVALID_TIMEFRAME");
        assert!(resp.message.contains("3x"));
    }

    #[test]
    fn test_error_serializes_as_response() {
        let json = serde_json::to_value(AppError::MissingBaseSeries).unwrap();
        assert_eq!(json["code"], "MISSING_BASE_SERIES");
    }
}
