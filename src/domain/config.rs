//! Run configuration: Livermore strategy parameters, execution costs and
//! risk limits.
//!
//! Every component receives its slice of configuration through its
//! constructor; nothing reads process-global state. All values are read once
//! per run and never mutated afterwards.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

/// The named Livermore parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct LivermoreParams {
    /// Long moving-average length, and the number of consecutive bars the
    /// moving-average relationship must persist before a trend is confirmed.
    pub trend_confirmation_period: usize,
    /// Fraction a close must clear the pivot level by to count as a breakout.
    pub breakout_threshold: f64,
    /// Minimum distance of the close from the long MA, as a fraction, for an
    /// entry to be well-timed.
    pub market_timing_threshold: f64,
    pub volume_confirmation: bool,
    /// Lookback for pivot high/low and for return volatility.
    pub pivot_point_period: usize,
    /// Upper mood bound; the lower bound is `1 - market_mood_sensitivity`.
    pub market_mood_sensitivity: f64,
}

impl Default for LivermoreParams {
    fn default() -> Self {
        LivermoreParams {
            trend_confirmation_period: 20,
            breakout_threshold: 0.02,
            market_timing_threshold: 0.015,
            volume_confirmation: true,
            pivot_point_period: 50,
            market_mood_sensitivity: 0.8,
        }
    }
}

impl LivermoreParams {
    pub fn long_ma_period(&self) -> usize {
        self.trend_confirmation_period.max(1)
    }

    pub fn short_ma_period(&self) -> usize {
        (self.trend_confirmation_period / 2).max(1)
    }

    pub fn volume_period(&self) -> usize {
        self.trend_confirmation_period.max(1)
    }

    pub fn pivot_period(&self) -> usize {
        self.pivot_point_period.max(1)
    }

    /// Minimum number of bars before any derived signal is enabled.
    pub fn warmup_bars(&self) -> usize {
        self.long_ma_period().max(self.pivot_period())
    }

    pub fn overheated_bound(&self) -> f64 {
        self.market_mood_sensitivity
    }

    pub fn oversold_bound(&self) -> f64 {
        1.0 - self.market_mood_sensitivity
    }
}

/// Costs and sizing applied by the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    /// Commission as a fraction of traded notional, charged on both legs.
    pub commission_rate: f64,
    /// Floor applied to each leg's commission.
    pub min_commission: f64,
    /// Tax as a fraction of notional, charged on the sell leg only.
    pub tax_rate: f64,
    /// Adverse slippage applied to simulated fills, as a fraction.
    pub slippage_pct: f64,
    /// Minimum tradable quantity; every order is a whole multiple.
    pub lot_size: i64,
    /// Fraction of equity committed to a full-strength entry.
    pub position_fraction: f64,
    pub allow_shorting: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_rate: 0.0003,
            min_commission: 0.0,
            tax_rate: 0.001,
            slippage_pct: 0.0,
            lot_size: 100,
            position_fraction: 0.2,
            allow_shorting: false,
        }
    }
}

/// Protective exits fixed at entry time.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    /// Stop distance below (long) or above (short) entry; 0 disables.
    pub stop_loss_pct: f64,
    /// Target distance above (long) or below (short) entry; 0 disables.
    pub take_profit_pct: f64,
    /// Calendar days after which a position is closed at the bar close; 0 disables.
    pub max_holding_days: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            stop_loss_pct: 0.08,
            take_profit_pct: 0.20,
            max_holding_days: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub risk_free_rate: f64,
    pub params: LivermoreParams,
    pub execution: ExecutionConfig,
    pub risk: RiskConfig,
}

/// Where bars come from and how hard the upstream may be hit.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub data_dir: PathBuf,
    /// Disk cache for fetched series; disabled when absent.
    pub cache_dir: Option<PathBuf>,
    pub min_request_interval: Duration,
    pub fetch_workers: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulateSettings {
    pub delay: Duration,
    /// Batches between account summaries; 0 disables.
    pub summary_every: usize,
}

impl Default for SimulateSettings {
    fn default() -> Self {
        SimulateSettings {
            delay: Duration::from_millis(1000),
            summary_every: 22,
        }
    }
}

/// Exchange sessions on weekdays. Polls outside them fetch nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingHours {
    pub sessions: Vec<(NaiveTime, NaiveTime)>,
}

impl TradingHours {
    /// 09:30-11:30 and 13:00-15:00, the Shanghai/Shenzhen sessions.
    pub fn exchange_default() -> Self {
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        TradingHours {
            sessions: vec![(at(9, 30), at(11, 30)), (at(13, 0), at(15, 0))],
        }
    }

    /// Both session bounds are inclusive.
    pub fn is_open(&self, now: NaiveDateTime) -> bool {
        if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let time = now.time();
        self.sessions
            .iter()
            .any(|&(open, close)| open <= time && time <= close)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSettings {
    pub enable_real_trading: bool,
    pub poll_interval: Duration,
    pub lookback_days: u64,
    /// 0 polls until stopped.
    pub max_polls: usize,
    /// `None` polls around the clock.
    pub trading_hours: Option<TradingHours>,
}

impl Default for LiveSettings {
    fn default() -> Self {
        LiveSettings {
            enable_real_trading: false,
            poll_interval: Duration::from_secs(60),
            lookback_days: 60,
            max_polls: 0,
            trading_hours: Some(TradingHours::exchange_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_match_livermore_set() {
        let p = LivermoreParams::default();
        assert_eq!(p.trend_confirmation_period, 20);
        assert!((p.breakout_threshold - 0.02).abs() < f64::EPSILON);
        assert!((p.market_timing_threshold - 0.015).abs() < f64::EPSILON);
        assert!(p.volume_confirmation);
        assert_eq!(p.pivot_point_period, 50);
        assert!((p.market_mood_sensitivity - 0.8).abs() < f64::EPSILON);
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn trading_hours_cover_both_sessions_on_weekdays() {
        let hours = TradingHours::exchange_default();
        // 2024-07-10 is a Wednesday
        assert!(hours.is_open(at(2024, 7, 10, 9, 30)));
        assert!(hours.is_open(at(2024, 7, 10, 11, 30)));
        assert!(!hours.is_open(at(2024, 7, 10, 12, 0)));
        assert!(hours.is_open(at(2024, 7, 10, 14, 59)));
        assert!(!hours.is_open(at(2024, 7, 10, 15, 1)));
        assert!(!hours.is_open(at(2024, 7, 10, 9, 0)));
        // Saturday
        assert!(!hours.is_open(at(2024, 7, 13, 10, 0)));
    }

    #[test]
    fn derived_windows() {
        let p = LivermoreParams::default();
        assert_eq!(p.long_ma_period(), 20);
        assert_eq!(p.short_ma_period(), 10);
        assert_eq!(p.volume_period(), 20);
        assert_eq!(p.pivot_period(), 50);
        assert_eq!(p.warmup_bars(), 50);
    }

    #[test]
    fn short_ma_never_zero() {
        let p = LivermoreParams {
            trend_confirmation_period: 1,
            ..Default::default()
        };
        assert_eq!(p.short_ma_period(), 1);
        assert_eq!(p.long_ma_period(), 1);
    }

    #[test]
    fn mood_band_from_sensitivity() {
        let p = LivermoreParams::default();
        assert!((p.overheated_bound() - 0.8).abs() < 1e-12);
        assert!((p.oversold_bound() - 0.2).abs() < 1e-12);
    }
}
