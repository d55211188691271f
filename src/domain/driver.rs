//! Execution driver shared by backtest, simulation and live trading.
//!
//! The modes differ only in the [`BarSource`] and [`FillPort`] the driver is
//! built with. Per bar the pipeline is fixed: indicator update, risk check,
//! signal decision, override resolution, ledger application. After every
//! batch that processed at least one bar the book is marked to market once.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::config::RunConfig;
use crate::domain::error::LivermoreError;
use crate::domain::indicator::IndicatorStore;
use crate::domain::ledger::{ApplyOutcome, Decision, Ledger};
use crate::domain::ohlcv::Bar;
use crate::domain::portfolio::Portfolio;
use crate::domain::risk::RiskController;
use crate::domain::signal::{SignalEngine, SignalKind};
use crate::domain::source::{Batch, BarSource, Delivery};
use crate::ports::fill_port::{FillPort, OrderSide};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolState {
    WarmingUp,
    Active,
    /// Stopped after bad data; skipped for the rest of the run.
    Halted,
}

/// An order the fill port refused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedOrder {
    pub symbol: String,
    pub date: NaiveDate,
    pub side: OrderSide,
    pub quantity: i64,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub portfolio: Portfolio,
    pub signals_emitted: usize,
    pub failed_orders: Vec<FailedOrder>,
    pub halted_symbols: Vec<String>,
    pub symbol_states: BTreeMap<String, SymbolState>,
    pub batches_processed: usize,
    pub duplicates_skipped: usize,
    /// Bars that only warmed the indicators because they predate trading.
    pub history_bars: usize,
}

pub struct ExecutionDriver<S: BarSource, F: FillPort> {
    source: S,
    fills: F,
    store: IndicatorStore,
    engine: SignalEngine,
    ledger: Ledger,
    states: BTreeMap<String, SymbolState>,
    stop: Arc<AtomicBool>,
    summary_every: usize,
    signals_emitted: usize,
    failed_orders: Vec<FailedOrder>,
    halted_symbols: Vec<String>,
    batches_processed: usize,
    duplicates_skipped: usize,
    history_bars: usize,
}

impl<S: BarSource, F: FillPort> ExecutionDriver<S, F> {
    pub fn new(config: &RunConfig, source: S, fills: F) -> Self {
        ExecutionDriver {
            source,
            fills,
            store: IndicatorStore::new(config.params.clone()),
            engine: SignalEngine::new(config.params.clone(), config.execution.allow_shorting),
            ledger: Ledger::new(
                config.initial_capital,
                config.execution.clone(),
                RiskController::new(config.risk.clone()),
            ),
            states: BTreeMap::new(),
            stop: Arc::new(AtomicBool::new(false)),
            summary_every: 0,
            signals_emitted: 0,
            failed_orders: Vec::new(),
            halted_symbols: Vec::new(),
            batches_processed: 0,
            duplicates_skipped: 0,
            history_bars: 0,
        }
    }

    /// Share an externally owned stop flag.
    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Log an account summary every `batches` processed batches; 0 disables.
    pub fn with_summary_every(mut self, batches: usize) -> Self {
        self.summary_every = batches;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Drive the source to exhaustion or until the stop flag is raised. The
    /// flag is honored between batches only.
    pub fn run(mut self) -> Result<RunResult, LivermoreError> {
        while !self.stop.load(Ordering::SeqCst) {
            let Some(batch) = self.source.next_batch()? else {
                break;
            };
            self.process_batch(batch)?;
        }
        Ok(self.finish())
    }

    pub fn process_batch(&mut self, mut batch: Batch) -> Result<(), LivermoreError> {
        batch.bars.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        let delivery = self.source.delivery();

        let mut processed = 0usize;
        for bar in &batch.bars {
            if self.process_bar(bar, delivery)? {
                processed += 1;
            }
        }

        if processed > 0 {
            let equity = self.ledger.mark_to_market(batch.date);
            self.batches_processed += 1;
            debug!(date = %batch.date, bars = processed, equity, "batch processed");
            if self.summary_every > 0 && self.batches_processed % self.summary_every == 0 {
                self.log_summary(batch.date, equity);
            }
        }
        Ok(())
    }

    /// Returns whether the bar went through the pipeline. History before the
    /// source's trading start updates the indicators and stops there.
    fn process_bar(&mut self, bar: &Bar, delivery: Delivery) -> Result<bool, LivermoreError> {
        let state = *self
            .states
            .entry(bar.symbol.clone())
            .or_insert(SymbolState::WarmingUp);
        if state == SymbolState::Halted {
            return Ok(false);
        }

        if delivery == Delivery::AtLeastOnce && self.store.last_date(&bar.symbol) == Some(bar.date)
        {
            debug!(symbol = %bar.symbol, date = %bar.date, "duplicate bar skipped");
            self.duplicates_skipped += 1;
            return Ok(false);
        }

        let snapshot = match self.store.update(bar) {
            Ok(snapshot) => snapshot,
            Err(e @ LivermoreError::OutOfOrderData { .. }) => {
                self.halt(&bar.symbol, &e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if state == SymbolState::WarmingUp && snapshot.window_full {
            info!(symbol = %bar.symbol, date = %bar.date, bars = snapshot.bars_seen, "warm-up complete");
            self.states.insert(bar.symbol.clone(), SymbolState::Active);
        }
        if self.source.trading_from().is_some_and(|from| bar.date < from) {
            self.history_bars += 1;
            return Ok(false);
        }

        let position = self.ledger.position(&bar.symbol);
        let forced = position.and_then(|p| self.ledger.risk().check(p, bar));
        let signal = self.engine.decide(&bar.symbol, bar, &snapshot, position);
        if signal.kind != SignalKind::Hold {
            self.signals_emitted += 1;
            debug!(
                symbol = %bar.symbol,
                date = %bar.date,
                kind = %signal.kind,
                strength = signal.strength,
                mood = signal.mood,
                reasons = %signal.reasons,
                "signal"
            );
        }

        let decision = Decision::resolve(&signal, forced, bar.close);
        match self.ledger.apply(&decision, bar, &mut self.fills) {
            Ok(ApplyOutcome::Rejected {
                side,
                quantity,
                reason,
            }) => self.failed_orders.push(FailedOrder {
                symbol: bar.symbol.clone(),
                date: bar.date,
                side,
                quantity,
                reason,
            }),
            Ok(_) => {}
            Err(e) => {
                self.halt(&bar.symbol, &e);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn halt(&mut self, symbol: &str, error: &LivermoreError) {
        warn!(symbol = %symbol, error = %error, "symbol halted for the rest of the run");
        self.states.insert(symbol.to_string(), SymbolState::Halted);
        if !self.halted_symbols.iter().any(|s| s == symbol) {
            self.halted_symbols.push(symbol.to_string());
        }
    }

    fn log_summary(&self, date: NaiveDate, equity: f64) {
        let portfolio = self.ledger.portfolio();
        let initial = portfolio.initial_capital;
        let ret = if initial > 0.0 {
            (equity - initial) / initial * 100.0
        } else {
            0.0
        };
        info!(
            date = %date,
            equity,
            cash = portfolio.cash,
            positions = portfolio.position_count(),
            trades = portfolio.trades.len(),
            return_pct = ret,
            "account summary"
        );
    }

    fn finish(self) -> RunResult {
        RunResult {
            portfolio: self.ledger.into_portfolio(),
            signals_emitted: self.signals_emitted,
            failed_orders: self.failed_orders,
            halted_symbols: self.halted_symbols,
            symbol_states: self.states,
            batches_processed: self.batches_processed,
            duplicates_skipped: self.duplicates_skipped,
            history_bars: self.history_bars,
        }
    }
}
