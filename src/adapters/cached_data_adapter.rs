//! Two-tier caching wrapper around any `DataPort`.
//!
//! Lookups go to the in-process map first, then to CSV files under the cache
//! directory, and only then upstream. Upstream requests are spaced at least
//! `min_request_interval` apart across all fetch threads. Only ranges that
//! end before today are cached, so a live poll always sees fresh bars.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::adapters::csv_adapter::{read_series, write_series};
use crate::domain::error::LivermoreError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::DataPort;

type CacheKey = (String, NaiveDate, NaiveDate);

/// Spaces out upstream requests. Each caller reserves the next free slot under
/// the lock and sleeps outside it.
struct RequestPacer {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RequestPacer {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let now = Instant::now();
        let start = {
            let mut next = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
            let start = match *next {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            *next = Some(start + self.min_interval);
            start
        };
        if start > now {
            thread::sleep(start - now);
        }
    }
}

pub struct CachedDataPort<D: DataPort> {
    inner: D,
    cache_dir: Option<PathBuf>,
    memory: Mutex<HashMap<CacheKey, Vec<Bar>>>,
    pacer: RequestPacer,
    today: NaiveDate,
}

impl<D: DataPort> CachedDataPort<D> {
    pub fn new(inner: D, cache_dir: Option<PathBuf>, min_request_interval: Duration) -> Self {
        Self {
            inner,
            cache_dir,
            memory: Mutex::new(HashMap::new()),
            pacer: RequestPacer::new(min_request_interval),
            today: chrono::Local::now().date_naive(),
        }
    }

    /// Override the date used to decide whether a range is complete.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    fn disk_path(&self, key: &CacheKey) -> Option<PathBuf> {
        let (symbol, start, end) = key;
        self.cache_dir.as_ref().map(|dir| {
            dir.join(format!(
                "{}_{}_{}.csv",
                symbol,
                start.format("%Y%m%d"),
                end.format("%Y%m%d")
            ))
        })
    }

    fn remember(&self, key: CacheKey, bars: &[Bar]) {
        self.memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, bars.to_vec());
    }
}

impl<D: DataPort> DataPort for CachedDataPort<D> {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, LivermoreError> {
        let cacheable = end_date < self.today;
        let key: CacheKey = (symbol.to_string(), start_date, end_date);

        if cacheable {
            if let Some(bars) = self
                .memory
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&key)
            {
                debug!(symbol, "memory cache hit");
                return Ok(bars.clone());
            }

            if let Some(path) = self.disk_path(&key).filter(|p| p.exists()) {
                match read_series(&path, symbol) {
                    Ok(bars) => {
                        debug!(symbol, path = %path.display(), "disk cache hit");
                        self.remember(key, &bars);
                        return Ok(bars);
                    }
                    Err(e) => warn!(symbol, error = %e, "ignoring unreadable cache file"),
                }
            }
        }

        self.pacer.wait();
        let bars = self.inner.fetch_ohlcv(symbol, start_date, end_date)?;

        if cacheable && !bars.is_empty() {
            if let Some(path) = self.disk_path(&key) {
                if let Err(e) = write_series(&path, &bars) {
                    warn!(symbol, error = %e, "failed to write cache file");
                }
            }
            self.remember(key, &bars);
        }
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, LivermoreError> {
        self.inner.list_symbols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingFeed {
        calls: AtomicUsize,
    }

    impl CountingFeed {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DataPort for CountingFeed {
        fn fetch_ohlcv(
            &self,
            symbol: &str,
            start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<Bar>, LivermoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Bar {
                symbol: symbol.to_string(),
                date: start,
                open: 10.0,
                high: 10.5,
                low: 9.5,
                close: 10.2,
                volume: 1_000,
            }])
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn second_fetch_hits_memory() {
        let port = CachedDataPort::new(CountingFeed::new(), None, Duration::ZERO).with_today(d(30));
        let first = port.fetch_ohlcv("AAPL", d(1), d(10)).unwrap();
        let second = port.fetch_ohlcv("AAPL", d(1), d(10)).unwrap();
        assert_eq!(first, second);
        assert_eq!(port.inner().calls(), 1);
    }

    #[test]
    fn disk_cache_survives_new_instance() {
        let dir = TempDir::new().unwrap();
        let cache = Some(dir.path().to_path_buf());

        let port = CachedDataPort::new(CountingFeed::new(), cache.clone(), Duration::ZERO)
            .with_today(d(30));
        port.fetch_ohlcv("600519.SH", d(1), d(10)).unwrap();
        assert_eq!(port.inner().calls(), 1);

        let fresh = CachedDataPort::new(CountingFeed::new(), cache, Duration::ZERO).with_today(d(30));
        let bars = fresh.fetch_ohlcv("600519.SH", d(1), d(10)).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].symbol, "600519.SH");
        assert_eq!(fresh.inner().calls(), 0);
    }

    #[test]
    fn open_ended_range_is_not_cached() {
        let port = CachedDataPort::new(CountingFeed::new(), None, Duration::ZERO).with_today(d(10));
        port.fetch_ohlcv("AAPL", d(1), d(10)).unwrap();
        port.fetch_ohlcv("AAPL", d(1), d(10)).unwrap();
        assert_eq!(port.inner().calls(), 2);
    }

    #[test]
    fn pacer_spaces_requests() {
        let pacer = RequestPacer::new(Duration::from_millis(30));
        let started = Instant::now();
        pacer.wait();
        pacer.wait();
        pacer.wait();
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}
