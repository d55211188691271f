//! Configuration validation and materialization.
//!
//! Every value is read through the `ConfigPort`, checked, and turned into the
//! typed settings the run components take in their constructors. Unparsable
//! numbers are errors, not silent defaults.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};

use crate::domain::config::{
    DataSettings, ExecutionConfig, LiveSettings, LivermoreParams, RiskConfig, RunConfig,
    SimulateSettings, TradingHours,
};
use crate::domain::error::LivermoreError;
use crate::domain::universe::{DEFAULT_FETCH_WORKERS, parse_symbols};
use crate::ports::config_port::ConfigPort;

const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;
const DEFAULT_RISK_FREE_RATE: f64 = 0.03;
const REQUIRED_SECTIONS: [&str; 2] = ["backtest", "data"];

/// Check everything a run needs without starting one.
pub fn validate_config(config: &dyn ConfigPort) -> Result<(), LivermoreError> {
    for section in REQUIRED_SECTIONS {
        if !config.has_section(section) {
            return Err(LivermoreError::invalid(section, "-", "section is missing"));
        }
    }
    build_run_config(config)?;
    resolve_symbols(None, config)?;
    build_data_settings(config)?;
    build_simulate_settings(config)?;
    build_live_settings(config)?;
    Ok(())
}

pub fn build_run_config(config: &dyn ConfigPort) -> Result<RunConfig, LivermoreError> {
    let start_date = read_date(config, "backtest", "start_date")?;
    let end_date = read_date(config, "backtest", "end_date")?;
    if start_date >= end_date {
        return Err(LivermoreError::invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }

    let initial_capital = read_f64(config, "backtest", "initial_capital", DEFAULT_INITIAL_CAPITAL)?;
    if initial_capital <= 0.0 {
        return Err(LivermoreError::invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }

    let risk_free_rate = read_f64(config, "backtest", "risk_free_rate", DEFAULT_RISK_FREE_RATE)?;
    if !(0.0..1.0).contains(&risk_free_rate) {
        return Err(LivermoreError::invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }

    Ok(RunConfig {
        start_date,
        end_date,
        initial_capital,
        risk_free_rate,
        params: build_params(config)?,
        execution: build_execution(config)?,
        risk: build_risk(config)?,
    })
}

pub fn build_params(config: &dyn ConfigPort) -> Result<LivermoreParams, LivermoreError> {
    let d = LivermoreParams::default();
    let params = LivermoreParams {
        trend_confirmation_period: read_usize(
            config,
            "livermore",
            "trend_confirmation_period",
            d.trend_confirmation_period,
        )?,
        breakout_threshold: read_f64(config, "livermore", "breakout_threshold", d.breakout_threshold)?,
        market_timing_threshold: read_f64(
            config,
            "livermore",
            "market_timing_threshold",
            d.market_timing_threshold,
        )?,
        volume_confirmation: read_bool(config, "livermore", "volume_confirmation", d.volume_confirmation)?,
        pivot_point_period: read_usize(config, "livermore", "pivot_point_period", d.pivot_point_period)?,
        market_mood_sensitivity: read_f64(
            config,
            "livermore",
            "market_mood_sensitivity",
            d.market_mood_sensitivity,
        )?,
    };

    if params.trend_confirmation_period < 1 {
        return Err(LivermoreError::invalid(
            "livermore",
            "trend_confirmation_period",
            "must be at least 1",
        ));
    }
    if params.pivot_point_period < 1 {
        return Err(LivermoreError::invalid(
            "livermore",
            "pivot_point_period",
            "must be at least 1",
        ));
    }
    if params.breakout_threshold < 0.0 {
        return Err(LivermoreError::invalid(
            "livermore",
            "breakout_threshold",
            "must be non-negative",
        ));
    }
    if params.market_timing_threshold < 0.0 {
        return Err(LivermoreError::invalid(
            "livermore",
            "market_timing_threshold",
            "must be non-negative",
        ));
    }
    let s = params.market_mood_sensitivity;
    if !(s > 0.5 && s <= 1.0) {
        return Err(LivermoreError::invalid(
            "livermore",
            "market_mood_sensitivity",
            "must be in (0.5, 1]",
        ));
    }
    Ok(params)
}

pub fn build_execution(config: &dyn ConfigPort) -> Result<ExecutionConfig, LivermoreError> {
    let d = ExecutionConfig::default();
    let execution = ExecutionConfig {
        commission_rate: read_f64(config, "backtest", "commission_rate", d.commission_rate)?,
        min_commission: read_f64(config, "backtest", "min_commission", d.min_commission)?,
        tax_rate: read_f64(config, "backtest", "tax_rate", d.tax_rate)?,
        slippage_pct: read_f64(config, "backtest", "slippage_pct", d.slippage_pct)?,
        lot_size: read_i64(config, "backtest", "lot_size", d.lot_size)?,
        position_fraction: read_f64(config, "backtest", "position_fraction", d.position_fraction)?,
        allow_shorting: read_bool(config, "backtest", "allow_shorting", d.allow_shorting)?,
    };

    if execution.commission_rate < 0.0 {
        return Err(LivermoreError::invalid(
            "backtest",
            "commission_rate",
            "commission_rate must be non-negative",
        ));
    }
    if execution.min_commission < 0.0 {
        return Err(LivermoreError::invalid(
            "backtest",
            "min_commission",
            "min_commission must be non-negative",
        ));
    }
    if !(0.0..1.0).contains(&execution.tax_rate) {
        return Err(LivermoreError::invalid(
            "backtest",
            "tax_rate",
            "tax_rate must be in [0, 1)",
        ));
    }
    if !(0.0..1.0).contains(&execution.slippage_pct) {
        return Err(LivermoreError::invalid(
            "backtest",
            "slippage_pct",
            "slippage_pct must be in [0, 1)",
        ));
    }
    if execution.lot_size < 1 {
        return Err(LivermoreError::invalid(
            "backtest",
            "lot_size",
            "lot_size must be at least 1",
        ));
    }
    if !(execution.position_fraction > 0.0 && execution.position_fraction <= 1.0) {
        return Err(LivermoreError::invalid(
            "backtest",
            "position_fraction",
            "position_fraction must be in (0, 1]",
        ));
    }
    Ok(execution)
}

pub fn build_risk(config: &dyn ConfigPort) -> Result<RiskConfig, LivermoreError> {
    let d = RiskConfig::default();
    let risk = RiskConfig {
        stop_loss_pct: read_f64(config, "risk", "stop_loss_pct", d.stop_loss_pct)?,
        take_profit_pct: read_f64(config, "risk", "take_profit_pct", d.take_profit_pct)?,
        max_holding_days: read_i64(config, "risk", "max_holding_days", d.max_holding_days)?,
    };
    if !(0.0..1.0).contains(&risk.stop_loss_pct) {
        return Err(LivermoreError::invalid(
            "risk",
            "stop_loss_pct",
            "stop_loss_pct must be in [0, 1)",
        ));
    }
    if risk.take_profit_pct < 0.0 {
        return Err(LivermoreError::invalid(
            "risk",
            "take_profit_pct",
            "take_profit_pct must be non-negative",
        ));
    }
    if risk.max_holding_days < 0 {
        return Err(LivermoreError::invalid(
            "risk",
            "max_holding_days",
            "max_holding_days must be non-negative",
        ));
    }
    Ok(risk)
}

pub fn build_data_settings(config: &dyn ConfigPort) -> Result<DataSettings, LivermoreError> {
    let data_dir = match config.get_string("data", "data_dir") {
        Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ => {
            return Err(LivermoreError::ConfigMissing {
                section: "data".into(),
                key: "data_dir".into(),
            });
        }
    };
    let cache_dir = config
        .get_string("data", "cache_dir")
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .map(PathBuf::from);
    let interval_ms = read_u64(config, "data", "min_request_interval_ms", 0)?;
    let fetch_workers = read_usize(config, "data", "fetch_workers", DEFAULT_FETCH_WORKERS)?;
    if fetch_workers < 1 {
        return Err(LivermoreError::invalid(
            "data",
            "fetch_workers",
            "fetch_workers must be at least 1",
        ));
    }
    Ok(DataSettings {
        data_dir,
        cache_dir,
        min_request_interval: Duration::from_millis(interval_ms),
        fetch_workers,
    })
}

pub fn build_simulate_settings(config: &dyn ConfigPort) -> Result<SimulateSettings, LivermoreError> {
    let d = SimulateSettings::default();
    Ok(SimulateSettings {
        delay: Duration::from_millis(read_u64(
            config,
            "simulate",
            "delay_ms",
            d.delay.as_millis() as u64,
        )?),
        summary_every: read_usize(config, "simulate", "summary_every", d.summary_every)?,
    })
}

pub fn build_live_settings(config: &dyn ConfigPort) -> Result<LiveSettings, LivermoreError> {
    let d = LiveSettings::default();
    let poll_secs = read_u64(config, "live", "poll_interval_secs", d.poll_interval.as_secs())?;
    if poll_secs == 0 {
        return Err(LivermoreError::invalid(
            "live",
            "poll_interval_secs",
            "poll_interval_secs must be at least 1",
        ));
    }
    let lookback_days = read_u64(config, "live", "lookback_days", d.lookback_days)?;
    if lookback_days == 0 {
        return Err(LivermoreError::invalid(
            "live",
            "lookback_days",
            "lookback_days must be at least 1",
        ));
    }
    Ok(LiveSettings {
        enable_real_trading: read_bool(config, "live", "enable_real_trading", false)?,
        poll_interval: Duration::from_secs(poll_secs),
        lookback_days,
        max_polls: read_usize(config, "live", "max_polls", d.max_polls)?,
        trading_hours: read_trading_hours(config, d.trading_hours)?,
    })
}

/// `[live] trading_hours = 09:30-11:30, 13:00-15:00`; `always` disables the
/// gate.
fn read_trading_hours(
    config: &dyn ConfigPort,
    default: Option<TradingHours>,
) -> Result<Option<TradingHours>, LivermoreError> {
    let Some(raw) = config.get_string("live", "trading_hours") else {
        return Ok(default);
    };
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("always") {
        return Ok(None);
    }

    let bad = |reason: String| LivermoreError::invalid("live", "trading_hours", reason);
    let parse_time = |t: &str| {
        NaiveTime::parse_from_str(t.trim(), "%H:%M")
            .map_err(|_| bad(format!("invalid time '{}', expected HH:MM", t.trim())))
    };

    let mut sessions = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (open, close) = part
            .split_once('-')
            .ok_or_else(|| bad(format!("invalid session '{part}', expected HH:MM-HH:MM")))?;
        let (open, close) = (parse_time(open)?, parse_time(close)?);
        if open >= close {
            return Err(bad(format!("session '{part}' closes before it opens")));
        }
        sessions.push((open, close));
    }
    if sessions.is_empty() {
        return Err(bad("no sessions given".to_string()));
    }
    Ok(Some(TradingHours { sessions }))
}

/// Symbols from the override if given, otherwise `[backtest] symbols`.
pub fn resolve_symbols(
    symbol_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<Vec<String>, LivermoreError> {
    let raw = match symbol_override {
        Some(s) => s.to_string(),
        None => config
            .get_string("backtest", "symbols")
            .ok_or_else(|| LivermoreError::ConfigMissing {
                section: "backtest".into(),
                key: "symbols".into(),
            })?,
    };
    Ok(parse_symbols(&raw)?)
}

fn read_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<NaiveDate, LivermoreError> {
    let value = config
        .get_string(section, key)
        .ok_or_else(|| LivermoreError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })?;
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        LivermoreError::invalid(
            section,
            key,
            format!("invalid {key} format, expected YYYY-MM-DD"),
        )
    })
}

fn read_parsed<T: std::str::FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
    expected: &str,
) -> Result<T, LivermoreError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| LivermoreError::invalid(section, key, format!("expected {expected}, got {raw:?}"))),
    }
}

fn read_f64(config: &dyn ConfigPort, section: &str, key: &str, default: f64) -> Result<f64, LivermoreError> {
    let value = read_parsed(config, section, key, default, "a number")?;
    if !value.is_finite() {
        return Err(LivermoreError::invalid(section, key, "must be finite"));
    }
    Ok(value)
}

fn read_i64(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> Result<i64, LivermoreError> {
    read_parsed(config, section, key, default, "an integer")
}

fn read_u64(config: &dyn ConfigPort, section: &str, key: &str, default: u64) -> Result<u64, LivermoreError> {
    read_parsed(config, section, key, default, "a non-negative integer")
}

fn read_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, LivermoreError> {
    read_parsed(config, section, key, default, "a non-negative integer")
}

fn read_bool(config: &dyn ConfigPort, section: &str, key: &str, default: bool) -> Result<bool, LivermoreError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(LivermoreError::invalid(
                section,
                key,
                format!("expected true/false, got {raw:?}"),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    const VALID: &str = r#"
[backtest]
start_date = 2023-01-01
end_date = 2024-12-31
initial_capital = 100000
commission_rate = 0.0003
tax_rate = 0.001
symbols = 600519.SH, 000001.SZ

[livermore]
trend_confirmation_period = 20
breakout_threshold = 0.02
market_timing_threshold = 0.015
volume_confirmation = true
pivot_point_period = 50
market_mood_sensitivity = 0.8

[risk]
stop_loss_pct = 0.08
take_profit_pct = 0.2

[data]
data_dir = ./data
"#;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn with(extra_section: &str, line: &str) -> FileConfigAdapter {
        make_config(&VALID.replace(
            &format!("[{extra_section}]\n"),
            &format!("[{extra_section}]\n{line}\n"),
        ))
    }

    fn invalid_key(err: LivermoreError) -> String {
        match err {
            LivermoreError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {other}"),
        }
    }

    #[test]
    fn valid_config_passes() {
        let config = make_config(VALID);
        assert!(validate_config(&config).is_ok());
        let run = build_run_config(&config).unwrap();
        assert_eq!(run.params, LivermoreParams::default());
        assert!((run.execution.tax_rate - 0.001).abs() < f64::EPSILON);
        assert_eq!(run.execution.lot_size, 100);
        assert!((run.risk_free_rate - DEFAULT_RISK_FREE_RATE).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_data_section() {
        let config = make_config("[backtest]\nstart_date = 2023-01-01\n");
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, LivermoreError::ConfigInvalid { section, .. } if section == "data"));
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let config = make_config(&VALID.replace("initial_capital = 100000", "initial_capital = 0"));
        assert_eq!(invalid_key(build_run_config(&config).unwrap_err()), "initial_capital");
    }

    #[test]
    fn garbage_number_is_rejected() {
        let config = make_config(&VALID.replace("initial_capital = 100000", "initial_capital = lots"));
        assert_eq!(invalid_key(build_run_config(&config).unwrap_err()), "initial_capital");
    }

    #[test]
    fn start_must_precede_end() {
        let config = make_config(&VALID.replace("end_date = 2024-12-31", "end_date = 2022-12-31"));
        assert_eq!(invalid_key(build_run_config(&config).unwrap_err()), "start_date");
    }

    #[test]
    fn missing_start_date() {
        let config = make_config(&VALID.replace("start_date = 2023-01-01\n", ""));
        let err = build_run_config(&config).unwrap_err();
        assert!(matches!(err, LivermoreError::ConfigMissing { key, .. } if key == "start_date"));
    }

    #[test]
    fn tax_rate_bounds() {
        let config = make_config(&VALID.replace("tax_rate = 0.001", "tax_rate = 1.0"));
        assert_eq!(invalid_key(build_run_config(&config).unwrap_err()), "tax_rate");
        let config = make_config(&VALID.replace("tax_rate = 0.001", "tax_rate = -0.1"));
        assert_eq!(invalid_key(build_run_config(&config).unwrap_err()), "tax_rate");
    }

    #[test]
    fn negative_commission_rejected() {
        let config = make_config(&VALID.replace("commission_rate = 0.0003", "commission_rate = -1"));
        assert_eq!(invalid_key(build_run_config(&config).unwrap_err()), "commission_rate");
    }

    #[test]
    fn mood_sensitivity_range() {
        for bad in ["0.5", "1.2", "0.3"] {
            let config = make_config(&VALID.replace(
                "market_mood_sensitivity = 0.8",
                &format!("market_mood_sensitivity = {bad}"),
            ));
            assert_eq!(
                invalid_key(build_run_config(&config).unwrap_err()),
                "market_mood_sensitivity"
            );
        }
    }

    #[test]
    fn zero_periods_rejected() {
        let config = make_config(&VALID.replace(
            "trend_confirmation_period = 20",
            "trend_confirmation_period = 0",
        ));
        assert_eq!(
            invalid_key(build_run_config(&config).unwrap_err()),
            "trend_confirmation_period"
        );
        let config = make_config(&VALID.replace("pivot_point_period = 50", "pivot_point_period = 0"));
        assert_eq!(invalid_key(build_run_config(&config).unwrap_err()), "pivot_point_period");
    }

    #[test]
    fn bad_bool_rejected() {
        let config = make_config(&VALID.replace("volume_confirmation = true", "volume_confirmation = maybe"));
        assert_eq!(invalid_key(build_run_config(&config).unwrap_err()), "volume_confirmation");
    }

    #[test]
    fn position_fraction_bounds() {
        let config = with("backtest", "position_fraction = 1.5");
        assert_eq!(invalid_key(build_run_config(&config).unwrap_err()), "position_fraction");
    }

    #[test]
    fn missing_data_dir() {
        let config = make_config(&VALID.replace("data_dir = ./data\n", ""));
        let err = build_data_settings(&config).unwrap_err();
        assert!(matches!(err, LivermoreError::ConfigMissing { key, .. } if key == "data_dir"));
    }

    #[test]
    fn data_settings_defaults() {
        let settings = build_data_settings(&make_config(VALID)).unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("./data"));
        assert_eq!(settings.cache_dir, None);
        assert_eq!(settings.fetch_workers, DEFAULT_FETCH_WORKERS);
        assert_eq!(settings.min_request_interval, Duration::ZERO);
    }

    #[test]
    fn live_defaults_keep_trading_disabled() {
        let live = build_live_settings(&make_config(VALID)).unwrap();
        assert!(!live.enable_real_trading);
        assert_eq!(live.poll_interval, Duration::from_secs(60));
        assert_eq!(live.lookback_days, 60);
        assert_eq!(live.trading_hours, Some(TradingHours::exchange_default()));
    }

    #[test]
    fn trading_hours_parse_and_disable() {
        let custom = make_config(&format!(
            "{VALID}\n[live]\ntrading_hours = 09:00-12:00, 13:30-16:00\n"
        ));
        let hours = build_live_settings(&custom).unwrap().trading_hours.unwrap();
        assert_eq!(hours.sessions.len(), 2);
        assert_eq!(hours.sessions[1].1, NaiveTime::from_hms_opt(16, 0, 0).unwrap());

        let always = make_config(&format!("{VALID}\n[live]\ntrading_hours = always\n"));
        assert_eq!(build_live_settings(&always).unwrap().trading_hours, None);
    }

    #[test]
    fn trading_hours_rejects_inverted_session() {
        let config = make_config(&format!("{VALID}\n[live]\ntrading_hours = 15:00-09:30\n"));
        assert_eq!(
            invalid_key(build_live_settings(&config).unwrap_err()),
            "trading_hours"
        );
    }

    #[test]
    fn simulate_defaults() {
        let sim = build_simulate_settings(&make_config(VALID)).unwrap();
        assert_eq!(sim.delay, Duration::from_millis(1000));
        assert_eq!(sim.summary_every, 22);
    }

    #[test]
    fn symbols_override_wins() {
        let config = make_config(VALID);
        assert_eq!(
            resolve_symbols(None, &config).unwrap(),
            vec!["600519.SH", "000001.SZ"]
        );
        assert_eq!(resolve_symbols(Some("aapl"), &config).unwrap(), vec!["AAPL"]);
    }

    #[test]
    fn duplicate_symbols_rejected() {
        let config = make_config(&VALID.replace(
            "symbols = 600519.SH, 000001.SZ",
            "symbols = 600519.SH, 600519.sh",
        ));
        assert_eq!(invalid_key(resolve_symbols(None, &config).unwrap_err()), "symbols");
    }
}
