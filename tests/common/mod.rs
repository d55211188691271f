#![allow(dead_code)]

use chrono::NaiveDate;
use livermore::domain::config::{ExecutionConfig, LivermoreParams, RiskConfig, RunConfig};
use livermore::domain::error::LivermoreError;
pub use livermore::domain::ohlcv::Bar;
use livermore::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        _start_date: NaiveDate,
        _end_date: NaiveDate,
    ) -> Result<Vec<Bar>, LivermoreError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(LivermoreError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(symbol).cloned().unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, LivermoreError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// Date of the 1-based bar `n`, one calendar day apart.
pub fn day(n: usize) -> NaiveDate {
    start_date() + chrono::Duration::days(n as i64 - 1)
}

pub fn make_bar(symbol: &str, n: usize, open: f64, high: f64, low: f64, close: f64, volume: i64) -> Bar {
    Bar {
        symbol: symbol.to_string(),
        date: day(n),
        open,
        high,
        low,
        close,
        volume,
    }
}

pub fn flat_bar(symbol: &str, n: usize, close: f64, volume: i64) -> Bar {
    make_bar(symbol, n, close, close + 0.5, close - 0.5, close, volume)
}

pub const BASE_VOLUME: i64 = 10_000;
pub const PIVOT_HIGH: f64 = 101.5;
pub const BREAKOUT_CLOSE: f64 = 104.545;

/// Sixty daily bars for the default parameter set:
/// - bars 1-50 drift up 0.02 a day from 100.02 with constant volume, enough
///   to confirm an uptrend without ever breaking out
/// - bar 51 closes 3% above the 50-bar pivot high (101.5) on
///   `breakout_volume_multiple` times the average volume
/// - bars 52-59 hold at 104.5
/// - bar 60 gaps down through the 8% stop (open 95, low 94)
pub fn breakout_scenario(symbol: &str, breakout_volume_multiple: f64) -> Vec<Bar> {
    let mut bars: Vec<Bar> = (1..=50)
        .map(|n| flat_bar(symbol, n, 100.0 + 0.02 * n as f64, BASE_VOLUME))
        .collect();
    bars.push(make_bar(
        symbol,
        51,
        101.0,
        BREAKOUT_CLOSE + 0.2,
        101.0,
        BREAKOUT_CLOSE,
        (BASE_VOLUME as f64 * breakout_volume_multiple) as i64,
    ));
    for n in 52..=59 {
        bars.push(flat_bar(symbol, n, 104.5, BASE_VOLUME));
    }
    bars.push(make_bar(symbol, 60, 95.0, 96.0, 94.0, 95.0, BASE_VOLUME));
    bars
}

pub fn make_run_config() -> RunConfig {
    RunConfig {
        start_date: day(1),
        end_date: day(365),
        initial_capital: 100_000.0,
        risk_free_rate: 0.0,
        params: LivermoreParams::default(),
        execution: ExecutionConfig {
            commission_rate: 0.0003,
            tax_rate: 0.001,
            ..Default::default()
        },
        risk: RiskConfig::default(),
    }
}
