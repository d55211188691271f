//! Livermore signal engine.
//!
//! Combines four independent sub-conditions into one decision per bar:
//! trend (confirmed moving-average relationship), breakout through a pivot
//! level, volume confirmation, and a market-mood band. Exits on trend
//! reversal take priority over entries and ignore the other gates.

use std::fmt;

use chrono::NaiveDate;

use crate::domain::config::LivermoreParams;
use crate::domain::indicator::IndicatorSnapshot;
use crate::domain::ohlcv::Bar;
use crate::domain::position::{Position, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    EnterLong,
    EnterShort,
    ExitLong,
    ExitShort,
    Hold,
}

impl SignalKind {
    pub fn is_entry(self) -> bool {
        matches!(self, SignalKind::EnterLong | SignalKind::EnterShort)
    }

    pub fn is_exit(self) -> bool {
        matches!(self, SignalKind::ExitLong | SignalKind::ExitShort)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalKind::EnterLong => "ENTER_LONG",
            SignalKind::EnterShort => "ENTER_SHORT",
            SignalKind::ExitLong => "EXIT_LONG",
            SignalKind::ExitShort => "EXIT_SHORT",
            SignalKind::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// Which sub-conditions fired on this bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReasonTags {
    pub trend: bool,
    pub breakout: bool,
    pub volume: bool,
    pub sentiment: bool,
}

impl fmt::Display for ReasonTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = [
            (self.trend, "trend"),
            (self.breakout, "breakout"),
            (self.volume, "volume"),
            (self.sentiment, "sentiment"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect();
        if tags.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&tags.join("+"))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub date: NaiveDate,
    pub kind: SignalKind,
    pub strength: f64,
    pub reasons: ReasonTags,
    pub mood: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Sideways,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Breakout {
    Bullish,
    Bearish,
    None,
}

/// Sentiment score in [0, 1]; 0.5 is neutral.
pub fn mood_score(bar_return: f64, volume_change: f64, volatility: f64) -> f64 {
    (0.5 + 0.3 * bar_return + 0.2 * volume_change - 0.1 * volatility).clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct SignalEngine {
    params: LivermoreParams,
    allow_shorting: bool,
}

impl SignalEngine {
    pub fn new(params: LivermoreParams, allow_shorting: bool) -> Self {
        SignalEngine {
            params,
            allow_shorting,
        }
    }

    pub fn trend(&self, snapshot: &IndicatorSnapshot) -> Trend {
        let n = self.params.trend_confirmation_period.max(1) as i64;
        if snapshot.trend_streak >= n {
            Trend::Up
        } else if snapshot.trend_streak <= -n {
            Trend::Down
        } else {
            Trend::Sideways
        }
    }

    fn breakout(&self, close: f64, pivot_high: f64, pivot_low: f64) -> Breakout {
        let t = self.params.breakout_threshold;
        let up = close > pivot_high * (1.0 + t);
        let down = close < pivot_low * (1.0 - t);
        match (up, down) {
            (true, false) => Breakout::Bullish,
            (false, true) => Breakout::Bearish,
            _ => Breakout::None,
        }
    }

    fn breakout_excess(&self, close: f64, pivot: f64) -> f64 {
        if pivot <= 0.0 {
            return 0.0;
        }
        let distance = (close - pivot).abs() / pivot;
        let t = self.params.breakout_threshold;
        let excess = if t > 0.0 { (distance - t) / t } else { distance };
        excess.clamp(0.0, 1.0)
    }

    fn well_timed(&self, close: f64, long_ma: f64, side: Side) -> bool {
        if long_ma <= 0.0 {
            return false;
        }
        let distance = match side {
            Side::Long => (close - long_ma) / long_ma,
            Side::Short => (long_ma - close) / long_ma,
        };
        distance > self.params.market_timing_threshold
    }

    /// Decide on one bar. `position` is the symbol's open position, if any.
    pub fn decide(
        &self,
        symbol: &str,
        bar: &Bar,
        snapshot: &IndicatorSnapshot,
        position: Option<&Position>,
    ) -> Signal {
        let mut signal = Signal {
            symbol: symbol.to_string(),
            date: bar.date,
            kind: SignalKind::Hold,
            strength: 0.0,
            reasons: ReasonTags::default(),
            mood: 0.5,
        };

        if !snapshot.window_full {
            return signal;
        }
        let (Some(pivot_high), Some(pivot_low), Some(avg_volume), Some(long_ma)) = (
            snapshot.pivot_high,
            snapshot.pivot_low,
            snapshot.avg_volume,
            snapshot.long_ma,
        ) else {
            return signal;
        };

        let trend = self.trend(snapshot);
        signal.reasons.trend = trend != Trend::Sideways;

        match (position.map(|p| p.side), trend) {
            (Some(Side::Long), Trend::Down) => {
                signal.kind = SignalKind::ExitLong;
                return signal;
            }
            (Some(Side::Short), Trend::Up) => {
                signal.kind = SignalKind::ExitShort;
                return signal;
            }
            (Some(_), _) => return signal,
            (None, _) => {}
        }

        let bar_return = snapshot.prev_close.map_or(0.0, |p| bar.return_from(p));
        let volume_change = snapshot
            .prev_volume
            .map_or(0.0, |v| bar.volume_change_from(v));
        signal.mood = mood_score(bar_return, volume_change, snapshot.volatility);
        signal.reasons.sentiment = signal.mood > self.params.oversold_bound()
            && signal.mood < self.params.overheated_bound();

        let volume_above = bar.volume as f64 > avg_volume;
        signal.reasons.volume = volume_above;
        let volume_ok = volume_above || !self.params.volume_confirmation;

        let breakout = if volume_ok {
            self.breakout(bar.close, pivot_high, pivot_low)
        } else {
            Breakout::None
        };
        signal.reasons.breakout = breakout != Breakout::None;

        let long_setup = trend == Trend::Up
            && breakout == Breakout::Bullish
            && self.well_timed(bar.close, long_ma, Side::Long);
        let short_setup = trend == Trend::Down
            && breakout == Breakout::Bearish
            && self.well_timed(bar.close, long_ma, Side::Short);

        if !signal.reasons.sentiment {
            return signal;
        }

        let (kind, pivot) = match (long_setup, short_setup) {
            (true, false) => (SignalKind::EnterLong, pivot_high),
            (false, true) if self.allow_shorting => (SignalKind::EnterShort, pivot_low),
            _ => return signal,
        };

        let volume_excess = if avg_volume > 0.0 {
            (bar.volume as f64 / avg_volume - 1.0).clamp(0.0, 1.0)
        } else {
            0.0
        };
        signal.kind = kind;
        signal.strength =
            ((self.breakout_excess(bar.close, pivot) + volume_excess) / 2.0).clamp(0.0, 1.0);
        signal
    }
}
