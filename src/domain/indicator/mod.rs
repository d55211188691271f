//! Incremental per-symbol indicator state.
//!
//! - `IndicatorStore`: arena of per-symbol ring-buffer slots
//! - `IndicatorSnapshot`: the derived values handed to the signal engine
//! - `RollingWindow`: fixed-capacity circular buffer backing every window
//!
//! Pivot levels and average volume are taken over the bars *preceding* the
//! current one, so a close can break above the pivot high without lookahead.

pub mod stddev;
pub mod window;

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::domain::config::LivermoreParams;
use crate::domain::error::LivermoreError;
use crate::domain::ohlcv::Bar;

pub use window::RollingWindow;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub short_ma: Option<f64>,
    pub long_ma: Option<f64>,
    pub pivot_high: Option<f64>,
    pub pivot_low: Option<f64>,
    pub avg_volume: Option<f64>,
    /// Population stddev of close-to-close returns over the pivot window.
    pub volatility: f64,
    pub prev_close: Option<f64>,
    pub prev_volume: Option<f64>,
    /// Consecutive bars with short MA above (positive) or below (negative)
    /// the long MA.
    pub trend_streak: i64,
    pub bars_seen: usize,
    pub window_full: bool,
}

#[derive(Debug, Clone)]
struct SymbolSlot {
    short_closes: RollingWindow,
    long_closes: RollingWindow,
    highs: RollingWindow,
    lows: RollingWindow,
    volumes: RollingWindow,
    returns: RollingWindow,
    prev_close: Option<f64>,
    prev_volume: Option<f64>,
    trend_streak: i64,
    bars_seen: usize,
    last_date: Option<NaiveDate>,
}

impl SymbolSlot {
    fn new(params: &LivermoreParams) -> Self {
        SymbolSlot {
            short_closes: RollingWindow::new(params.short_ma_period()),
            long_closes: RollingWindow::new(params.long_ma_period()),
            highs: RollingWindow::new(params.pivot_period()),
            lows: RollingWindow::new(params.pivot_period()),
            volumes: RollingWindow::new(params.volume_period()),
            returns: RollingWindow::new(params.pivot_period()),
            prev_close: None,
            prev_volume: None,
            trend_streak: 0,
            bars_seen: 0,
            last_date: None,
        }
    }
}

fn full_mean(window: &RollingWindow) -> Option<f64> {
    if window.is_full() { window.mean() } else { None }
}

/// Rolling technical state for every symbol seen in a run.
#[derive(Debug, Clone)]
pub struct IndicatorStore {
    params: LivermoreParams,
    slots: Vec<SymbolSlot>,
    index: HashMap<String, usize>,
}

impl IndicatorStore {
    pub fn new(params: LivermoreParams) -> Self {
        IndicatorStore {
            params,
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn symbol_count(&self) -> usize {
        self.slots.len()
    }

    pub fn last_date(&self, symbol: &str) -> Option<NaiveDate> {
        self.index
            .get(symbol)
            .and_then(|&i| self.slots[i].last_date)
    }

    fn slot_mut(&mut self, symbol: &str) -> &mut SymbolSlot {
        let idx = match self.index.get(symbol) {
            Some(&i) => i,
            None => {
                self.slots.push(SymbolSlot::new(&self.params));
                let i = self.slots.len() - 1;
                self.index.insert(symbol.to_string(), i);
                i
            }
        };
        &mut self.slots[idx]
    }

    /// Fold the next bar for `bar.symbol` into its windows.
    ///
    /// Fails with `OutOfOrderData`, leaving the symbol untouched, when the bar
    /// is not strictly after the last accepted one.
    pub fn update(&mut self, bar: &Bar) -> Result<IndicatorSnapshot, LivermoreError> {
        if let Some(last) = self.last_date(&bar.symbol) {
            if bar.date <= last {
                return Err(LivermoreError::OutOfOrderData {
                    symbol: bar.symbol.clone(),
                    date: bar.date,
                    last,
                });
            }
        }

        let slot = self.slot_mut(&bar.symbol);

        let pivot_high = if slot.highs.is_full() { slot.highs.max() } else { None };
        let pivot_low = if slot.lows.is_full() { slot.lows.min() } else { None };
        let avg_volume = full_mean(&slot.volumes);
        let prev_close = slot.prev_close;
        let prev_volume = slot.prev_volume;

        slot.short_closes.push(bar.close);
        slot.long_closes.push(bar.close);
        let short_ma = full_mean(&slot.short_closes);
        let long_ma = full_mean(&slot.long_closes);

        if let (Some(short), Some(long)) = (short_ma, long_ma) {
            slot.trend_streak = if short > long {
                slot.trend_streak.max(0) + 1
            } else if short < long {
                slot.trend_streak.min(0) - 1
            } else {
                0
            };
        }

        if let Some(prev) = prev_close {
            slot.returns.push(bar.return_from(prev));
        }
        let volatility = stddev::population_stddev(&slot.returns);

        slot.highs.push(bar.high);
        slot.lows.push(bar.low);
        slot.volumes.push(bar.volume as f64);
        slot.prev_close = Some(bar.close);
        slot.prev_volume = Some(bar.volume as f64);
        slot.bars_seen += 1;
        slot.last_date = Some(bar.date);

        let window_full = long_ma.is_some() && pivot_high.is_some() && avg_volume.is_some();

        Ok(IndicatorSnapshot {
            short_ma,
            long_ma,
            pivot_high,
            pivot_low,
            avg_volume,
            volatility,
            prev_close,
            prev_volume,
            trend_streak: slot.trend_streak,
            bars_seen: slot.bars_seen,
            window_full,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(trend: usize, pivot: usize) -> LivermoreParams {
        LivermoreParams {
            trend_confirmation_period: trend,
            pivot_point_period: pivot,
            ..Default::default()
        }
    }

    fn bar(symbol: &str, day: u32, close: f64, volume: i64) -> Bar {
        Bar {
            symbol: symbol.into(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
        }
    }

    #[test]
    fn warmup_until_pivot_window_has_prior_bars() {
        let mut store = IndicatorStore::new(params(4, 3));
        let mut full = Vec::new();
        for day in 1..=6 {
            let snap = store.update(&bar("A", day, 10.0, 100)).unwrap();
            full.push(snap.window_full);
        }
        // long MA full at bar 4, pivot/volume windows hold 3 and 4 prior bars
        // respectively from bar 5 onward
        assert_eq!(full, vec![false, false, false, false, true, true]);
    }

    #[test]
    fn pivot_excludes_current_bar() {
        let mut store = IndicatorStore::new(params(2, 3));
        for (day, close) in [(1, 10.0), (2, 11.0), (3, 12.0)] {
            store.update(&bar("A", day, close, 100)).unwrap();
        }
        let snap = store.update(&bar("A", 4, 50.0, 100)).unwrap();
        assert_eq!(snap.pivot_high, Some(13.0));
        assert_eq!(snap.pivot_low, Some(9.0));
    }

    #[test]
    fn average_volume_excludes_current_bar() {
        let mut store = IndicatorStore::new(params(2, 2));
        store.update(&bar("A", 1, 10.0, 100)).unwrap();
        store.update(&bar("A", 2, 10.0, 300)).unwrap();
        let snap = store.update(&bar("A", 3, 10.0, 10_000)).unwrap();
        assert_eq!(snap.avg_volume, Some(200.0));
        assert_eq!(snap.prev_volume, Some(300.0));
    }

    #[test]
    fn moving_averages() {
        let mut store = IndicatorStore::new(params(4, 2));
        let mut last = None;
        for (day, close) in [(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)] {
            last = Some(store.update(&bar("A", day, close, 100)).unwrap());
        }
        let snap = last.unwrap();
        assert_eq!(snap.short_ma, Some(3.5));
        assert_eq!(snap.long_ma, Some(2.5));
    }

    #[test]
    fn trend_streak_counts_and_resets() {
        let mut store = IndicatorStore::new(params(2, 2));
        let closes = [10.0, 11.0, 12.0, 13.0, 12.0, 11.0];
        let streaks: Vec<i64> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                store
                    .update(&bar("A", i as u32 + 1, c, 100))
                    .unwrap()
                    .trend_streak
            })
            .collect();
        // short MA = last close, long MA = mean of last two
        assert_eq!(streaks, vec![0, 1, 2, 3, -1, -2]);
    }

    #[test]
    fn out_of_order_leaves_state_unchanged() {
        let mut store = IndicatorStore::new(params(2, 2));
        store.update(&bar("A", 2, 10.0, 100)).unwrap();
        let err = store.update(&bar("A", 2, 99.0, 100)).unwrap_err();
        assert!(matches!(err, LivermoreError::OutOfOrderData { .. }));
        let err = store.update(&bar("A", 1, 99.0, 100)).unwrap_err();
        assert!(matches!(err, LivermoreError::OutOfOrderData { .. }));

        let snap = store.update(&bar("A", 3, 10.0, 100)).unwrap();
        assert_eq!(snap.bars_seen, 2);
        assert_eq!(snap.prev_close, Some(10.0));
    }

    #[test]
    fn symbols_are_independent() {
        let mut store = IndicatorStore::new(params(2, 2));
        store.update(&bar("A", 5, 10.0, 100)).unwrap();
        let snap = store.update(&bar("B", 1, 20.0, 100)).unwrap();
        assert_eq!(snap.bars_seen, 1);
        assert_eq!(store.symbol_count(), 2);
        assert_eq!(
            store.last_date("A"),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
    }

    #[test]
    fn volatility_of_returns() {
        let mut store = IndicatorStore::new(params(2, 3));
        store.update(&bar("A", 1, 100.0, 100)).unwrap();
        store.update(&bar("A", 2, 110.0, 100)).unwrap();
        let snap = store.update(&bar("A", 3, 99.0, 100)).unwrap();
        // returns 0.10 and -0.10 → population stddev 0.10
        assert!((snap.volatility - 0.10).abs() < 1e-12);
    }
}
