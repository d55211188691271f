//! Bar sources: where the execution driver gets its bars from.
//!
//! All sources hand out per-date batches. Backtests replay fetched series
//! over a unified timeline, simulation paces the same replay in wall-clock
//! time, and live trading re-polls a `DataPort`, which may deliver the most
//! recent bar more than once.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::{Days, Local, NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

use crate::domain::config::TradingHours;
use crate::domain::error::LivermoreError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Every bar is delivered once; a repeated date is out-of-order data.
    ExactlyOnce,
    /// A bar may be re-delivered; a repeat of the last processed date is a
    /// duplicate to skip.
    AtLeastOnce,
}

/// All bars sharing one timeline date.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub date: NaiveDate,
    pub bars: Vec<Bar>,
}

pub trait BarSource {
    fn delivery(&self) -> Delivery;

    /// Next batch, or `None` once the source is exhausted.
    fn next_batch(&mut self) -> Result<Option<Batch>, LivermoreError>;

    /// Bars dated before this only warm the indicators; they are never
    /// traded. `None` trades every bar.
    fn trading_from(&self) -> Option<NaiveDate> {
        None
    }
}

pub fn build_unified_timeline(series: &BTreeMap<String, Vec<Bar>>) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = series
        .values()
        .flat_map(|bars| bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}

/// Replays per-symbol series in timeline order.
///
/// Each series is consumed in the order given. A bar dated earlier than its
/// predecessor is released with the next timeline batch, where the driver
/// will reject it.
#[derive(Debug, Clone)]
pub struct HistoricalSource {
    series: BTreeMap<String, Vec<Bar>>,
    cursors: BTreeMap<String, usize>,
    timeline: Vec<NaiveDate>,
    next: usize,
}

impl HistoricalSource {
    pub fn new(series: BTreeMap<String, Vec<Bar>>) -> Self {
        let timeline = build_unified_timeline(&series);
        let cursors = series.keys().map(|s| (s.clone(), 0)).collect();
        HistoricalSource {
            series,
            cursors,
            timeline,
            next: 0,
        }
    }

    pub fn from_bars(bars: Vec<Bar>) -> Self {
        let mut series: BTreeMap<String, Vec<Bar>> = BTreeMap::new();
        for bar in bars {
            series.entry(bar.symbol.clone()).or_default().push(bar);
        }
        Self::new(series)
    }

    pub fn timeline(&self) -> &[NaiveDate] {
        &self.timeline
    }

    pub fn remaining(&self) -> usize {
        self.timeline.len() - self.next
    }
}

impl BarSource for HistoricalSource {
    fn delivery(&self) -> Delivery {
        Delivery::ExactlyOnce
    }

    fn next_batch(&mut self) -> Result<Option<Batch>, LivermoreError> {
        let Some(&date) = self.timeline.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;

        let mut bars = Vec::new();
        for (symbol, series) in &self.series {
            let cursor = self.cursors.entry(symbol.clone()).or_insert(0);
            while let Some(bar) = series.get(*cursor) {
                if bar.date > date {
                    break;
                }
                bars.push(bar.clone());
                *cursor += 1;
            }
        }
        Ok(Some(Batch { date, bars }))
    }
}

/// Wraps another source and waits between batches, for paper simulation.
pub struct PacedSource<S: BarSource> {
    inner: S,
    delay: Duration,
    started: bool,
}

impl<S: BarSource> PacedSource<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        PacedSource {
            inner,
            delay,
            started: false,
        }
    }
}

impl<S: BarSource> BarSource for PacedSource<S> {
    fn delivery(&self) -> Delivery {
        self.inner.delivery()
    }

    fn next_batch(&mut self) -> Result<Option<Batch>, LivermoreError> {
        if self.started && !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.started = true;
        self.inner.next_batch()
    }
}

/// Live feed built by polling a `DataPort` over a trailing window.
///
/// Each poll re-fetches `lookback_days` of history per symbol and releases
/// everything from the newest date already released onward, so the latest
/// bar is delivered again until a newer one appears.
///
/// History dated before the session start is released for indicator warm-up
/// only. With trading hours set, poll cycles outside the sessions fetch
/// nothing.
pub struct PollingSource<'a, D: DataPort + ?Sized> {
    data: &'a D,
    symbols: Vec<String>,
    lookback_days: u64,
    interval: Duration,
    max_polls: Option<usize>,
    as_of: Option<NaiveDate>,
    session_start: Option<NaiveDate>,
    opened_on: NaiveDate,
    trading_hours: Option<TradingHours>,
    clock: fn() -> NaiveDateTime,
    stop: Arc<AtomicBool>,
    polls: usize,
    released: BTreeMap<String, NaiveDate>,
    pending: VecDeque<Batch>,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl<'a, D: DataPort + ?Sized> PollingSource<'a, D> {
    pub fn new(data: &'a D, symbols: Vec<String>, lookback_days: u64, interval: Duration) -> Self {
        PollingSource {
            data,
            symbols,
            lookback_days,
            interval,
            max_polls: None,
            as_of: None,
            session_start: None,
            opened_on: Local::now().date_naive(),
            trading_hours: None,
            clock: local_now,
            stop: Arc::new(AtomicBool::new(false)),
            polls: 0,
            released: BTreeMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Stop after this many polls instead of running until stopped.
    pub fn with_max_polls(mut self, max_polls: usize) -> Self {
        self.max_polls = Some(max_polls);
        self
    }

    /// Poll as of a fixed date rather than the local calendar date. Unless
    /// a session start is set, trading starts on this date.
    pub fn with_as_of(mut self, date: NaiveDate) -> Self {
        self.as_of = Some(date);
        self
    }

    /// First date whose bars may be traded.
    pub fn with_session_start(mut self, date: NaiveDate) -> Self {
        self.session_start = Some(date);
        self
    }

    pub fn with_trading_hours(mut self, hours: TradingHours) -> Self {
        self.trading_hours = Some(hours);
        self
    }

    /// Wall clock checked against the trading hours.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn wait_interval(&self) {
        let step = Duration::from_millis(200);
        let mut waited = Duration::ZERO;
        while waited < self.interval && !self.stopped() {
            let nap = step.min(self.interval - waited);
            thread::sleep(nap);
            waited += nap;
        }
    }

    fn market_open(&self) -> bool {
        self.trading_hours
            .as_ref()
            .is_none_or(|hours| hours.is_open((self.clock)()))
    }

    fn poll(&mut self) {
        self.polls += 1;
        if !self.market_open() {
            debug!(poll = self.polls, "outside trading hours; nothing fetched");
            return;
        }

        let end = self.as_of.unwrap_or_else(|| Local::now().date_naive());
        let start = end
            .checked_sub_days(Days::new(self.lookback_days))
            .unwrap_or(end);

        let mut series: BTreeMap<String, Vec<Bar>> = BTreeMap::new();
        for symbol in &self.symbols {
            let bars = match self.data.fetch_ohlcv(symbol, start, end) {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "poll failed; symbol skipped this cycle");
                    continue;
                }
            };
            let floor = self.released.get(symbol).copied();
            let fresh: Vec<Bar> = bars
                .into_iter()
                .filter(|bar| floor.is_none_or(|f| bar.date >= f))
                .collect();
            if let Some(latest) = fresh.iter().map(|bar| bar.date).max() {
                self.released.insert(symbol.clone(), latest);
            }
            if !fresh.is_empty() {
                series.insert(symbol.clone(), fresh);
            }
        }

        let mut replay = HistoricalSource::new(series);
        while let Ok(Some(batch)) = replay.next_batch() {
            self.pending.push_back(batch);
        }
        debug!(poll = self.polls, batches = self.pending.len(), "polled live data");
    }
}

impl<D: DataPort + ?Sized> BarSource for PollingSource<'_, D> {
    fn delivery(&self) -> Delivery {
        Delivery::AtLeastOnce
    }

    fn trading_from(&self) -> Option<NaiveDate> {
        Some(self.session_start.or(self.as_of).unwrap_or(self.opened_on))
    }

    fn next_batch(&mut self) -> Result<Option<Batch>, LivermoreError> {
        loop {
            if let Some(batch) = self.pending.pop_front() {
                return Ok(Some(batch));
            }
            if self.stopped() || self.max_polls.is_some_and(|max| self.polls >= max) {
                return Ok(None);
            }
            if self.polls > 0 {
                self.wait_interval();
                if self.stopped() {
                    return Ok(None);
                }
            }
            self.poll();
        }
    }
}
