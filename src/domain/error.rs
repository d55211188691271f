//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for livermore.
#[derive(Debug, thiserror::Error)]
pub enum LivermoreError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("out-of-order bar for {symbol}: {date} is not after {last}")]
    OutOfOrderData {
        symbol: String,
        date: NaiveDate,
        last: NaiveDate,
    },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("order rejected for {symbol}: {reason}")]
    OrderRejected { symbol: String, reason: String },

    #[error("live trading is disabled; set [live] enable_real_trading = true")]
    LiveTradingDisabled,

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LivermoreError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        LivermoreError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&LivermoreError> for std::process::ExitCode {
    fn from(err: &LivermoreError) -> Self {
        let code: u8 = match err {
            LivermoreError::Io(_) | LivermoreError::Csv(_) => 1,
            LivermoreError::ConfigParse { .. }
            | LivermoreError::ConfigMissing { .. }
            | LivermoreError::ConfigInvalid { .. }
            | LivermoreError::LiveTradingDisabled => 2,
            LivermoreError::DataSource { .. } | LivermoreError::NoData { .. } => 3,
            LivermoreError::OutOfOrderData { .. } => 4,
            LivermoreError::OrderRejected { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_message_names_both_dates() {
        let err = LivermoreError::OutOfOrderData {
            symbol: "600000.SH".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            last: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "out-of-order bar for 600000.SH: 2024-01-02 is not after 2024-01-03"
        );
    }

    #[test]
    fn invalid_helper_builds_config_invalid() {
        let err = LivermoreError::invalid("backtest", "tax_rate", "must be below 1");
        assert_eq!(
            err.to_string(),
            "invalid config value [backtest] tax_rate: must be below 1"
        );
    }
}
