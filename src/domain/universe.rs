//! Trading universe: symbol list parsing and bulk loading of daily series.
//!
//! Series are fetched on a bounded rayon pool. A symbol whose fetch fails or
//! returns no bars is skipped for the run; the rest continue.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::error::LivermoreError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::DataPort;

pub const DEFAULT_FETCH_WORKERS: usize = 5;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("no symbols configured")]
    Empty,
}

impl From<UniverseError> for LivermoreError {
    fn from(e: UniverseError) -> Self {
        LivermoreError::invalid("backtest", "symbols", e.to_string())
    }
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    if input.trim().is_empty() {
        return Err(UniverseError::Empty);
    }
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    FetchFailed(String),
    NoData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedUniverse {
    pub series: BTreeMap<String, Vec<Bar>>,
    pub skipped: Vec<SkippedSymbol>,
}

impl LoadedUniverse {
    pub fn symbols(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    pub fn bar_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }
}

/// Fetch every symbol concurrently on a pool of at most `workers` threads.
/// Results come back in input order.
pub fn fetch_universe<D: DataPort + ?Sized>(
    data_port: &D,
    symbols: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
    workers: usize,
) -> Result<Vec<(String, Result<Vec<Bar>, LivermoreError>)>, LivermoreError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| LivermoreError::DataSource {
            reason: format!("failed to start fetch pool: {e}"),
        })?;

    Ok(pool.install(|| {
        symbols
            .par_iter()
            .map(|symbol| {
                let result = data_port.fetch_ohlcv(symbol, start_date, end_date);
                (symbol.clone(), result)
            })
            .collect()
    }))
}

pub fn load_universe<D: DataPort + ?Sized>(
    data_port: &D,
    symbols: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
    workers: usize,
) -> Result<LoadedUniverse, LivermoreError> {
    let mut loaded = LoadedUniverse::default();

    for (symbol, result) in fetch_universe(data_port, symbols, start_date, end_date, workers)? {
        match result {
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "skipping symbol: fetch failed");
                loaded.skipped.push(SkippedSymbol {
                    symbol,
                    reason: SkipReason::FetchFailed(e.to_string()),
                });
            }
            Ok(bars) if bars.is_empty() => {
                warn!(symbol = %symbol, "skipping symbol: no data");
                loaded.skipped.push(SkippedSymbol {
                    symbol,
                    reason: SkipReason::NoData,
                });
            }
            Ok(bars) => {
                info!(symbol = %symbol, bars = bars.len(), "loaded");
                loaded.series.insert(symbol, bars);
            }
        }
    }

    if loaded.series.is_empty() {
        return Err(LivermoreError::NoData {
            symbol: symbols.join(","),
        });
    }
    Ok(loaded)
}
