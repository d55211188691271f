//! Protective exits evaluated ahead of the signal engine.
//!
//! Stop-loss and take-profit levels are fixed when a position opens and never
//! trailed. When one bar touches both, the stop wins.
//!
//! A short always carries a stop no further than [`SHORT_LOSS_CAP`] above
//! entry, so its loss stays inside the escrowed notional. Only a gap open
//! beyond that level can draw on free cash.

use crate::domain::config::RiskConfig;
use crate::domain::ohlcv::Bar;
use crate::domain::position::{ExitReason, Position, Side};

/// Largest loss a short may run, as a fraction of its entry notional.
pub const SHORT_LOSS_CAP: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForcedExit {
    pub price: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone)]
pub struct RiskController {
    config: RiskConfig,
}

impl RiskController {
    pub fn new(config: RiskConfig) -> Self {
        RiskController { config }
    }

    /// Stop-loss and take-profit prices for a new position; 0 disables a leg.
    /// A short's stop is never disabled and never beyond the loss cap.
    pub fn levels(&self, side: Side, entry_price: f64) -> (f64, f64) {
        let stop_pct = self.config.stop_loss_pct;
        let target_pct = self.config.take_profit_pct;
        let stop = match side {
            Side::Long if stop_pct > 0.0 => entry_price * (1.0 - stop_pct),
            Side::Long => 0.0,
            Side::Short if stop_pct > 0.0 => entry_price * (1.0 + stop_pct.min(SHORT_LOSS_CAP)),
            Side::Short => entry_price * (1.0 + SHORT_LOSS_CAP),
        };
        let target = if target_pct > 0.0 {
            match side {
                Side::Long => entry_price * (1.0 + target_pct),
                Side::Short => entry_price * (1.0 - target_pct),
            }
        } else {
            0.0
        };
        (stop, target)
    }

    pub fn check(&self, position: &Position, bar: &Bar) -> Option<ForcedExit> {
        if let Some(exit) = self.stop_hit(position, bar) {
            return Some(exit);
        }
        if let Some(exit) = self.target_hit(position, bar) {
            return Some(exit);
        }
        let max_days = self.config.max_holding_days;
        if max_days > 0 && position.holding_days(bar.date) >= max_days {
            return Some(ForcedExit {
                price: bar.close,
                reason: ExitReason::TimeStop,
            });
        }
        None
    }

    fn stop_hit(&self, position: &Position, bar: &Bar) -> Option<ForcedExit> {
        let stop = position.stop_loss;
        if stop <= 0.0 {
            return None;
        }
        // a gap through the stop fills at the open, never better
        let price = match position.side {
            Side::Long if bar.low <= stop => bar.open.min(stop),
            Side::Short if bar.high >= stop => bar.open.max(stop),
            _ => return None,
        };
        Some(ForcedExit {
            price,
            reason: ExitReason::StopLoss,
        })
    }

    fn target_hit(&self, position: &Position, bar: &Bar) -> Option<ForcedExit> {
        let target = position.take_profit;
        if target <= 0.0 {
            return None;
        }
        let hit = match position.side {
            Side::Long => bar.high >= target,
            Side::Short => bar.low <= target,
        };
        hit.then_some(ForcedExit {
            price: target,
            reason: ExitReason::TakeProfit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn controller() -> RiskController {
        RiskController::new(RiskConfig {
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
            max_holding_days: 0,
        })
    }

    fn position(side: Side) -> Position {
        let (stop_loss, take_profit) = controller().levels(side, 100.0);
        Position {
            symbol: "601318.SH".into(),
            side,
            quantity: 100,
            entry_price: 100.0,
            entry_date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            stop_loss,
            take_profit,
            entry_commission: 3.0,
            entry_tax: 0.0,
        }
    }

    fn bar(day: u32, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            symbol: "601318.SH".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn levels_from_entry() {
        let (stop, target) = controller().levels(Side::Long, 100.0);
        assert!((stop - 95.0).abs() < 1e-9);
        assert!((target - 110.0).abs() < 1e-9);
        let (stop, target) = controller().levels(Side::Short, 100.0);
        assert!((stop - 105.0).abs() < 1e-9);
        assert!((target - 90.0).abs() < 1e-9);
    }

    #[test]
    fn long_stop_fills_at_stop_not_intrabar_high() {
        let exit = controller()
            .check(&position(Side::Long), &bar(7, 99.0, 101.0, 94.0, 100.0))
            .unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert!((exit.price - 95.0).abs() < 1e-9);
    }

    #[test]
    fn long_gap_below_stop_fills_at_open() {
        let exit = controller()
            .check(&position(Side::Long), &bar(7, 93.0, 94.0, 92.0, 93.5))
            .unwrap();
        assert!((exit.price - 93.0).abs() < 1e-9);
    }

    #[test]
    fn long_take_profit() {
        let exit = controller()
            .check(&position(Side::Long), &bar(7, 105.0, 112.0, 104.0, 111.0))
            .unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit);
        assert!((exit.price - 110.0).abs() < 1e-9);
    }

    #[test]
    fn stop_wins_when_both_touched() {
        let exit = controller()
            .check(&position(Side::Long), &bar(7, 100.0, 115.0, 90.0, 100.0))
            .unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
    }

    #[test]
    fn short_stop_and_target() {
        let stop = controller()
            .check(&position(Side::Short), &bar(7, 101.0, 106.0, 100.0, 104.0))
            .unwrap();
        assert_eq!(stop.reason, ExitReason::StopLoss);
        assert!((stop.price - 105.0).abs() < 1e-9);

        let target = controller()
            .check(&position(Side::Short), &bar(7, 95.0, 96.0, 89.0, 90.0))
            .unwrap();
        assert_eq!(target.reason, ExitReason::TakeProfit);
        assert!((target.price - 90.0).abs() < 1e-9);
    }

    #[test]
    fn quiet_bar_is_not_forced() {
        assert!(
            controller()
                .check(&position(Side::Long), &bar(7, 100.0, 104.0, 96.0, 101.0))
                .is_none()
        );
    }

    #[test]
    fn disabled_levels_never_trigger() {
        let ctl = RiskController::new(RiskConfig {
            stop_loss_pct: 0.0,
            take_profit_pct: 0.0,
            max_holding_days: 0,
        });
        let (stop, target) = ctl.levels(Side::Long, 100.0);
        let pos = Position {
            stop_loss: stop,
            take_profit: target,
            ..position(Side::Long)
        };
        assert!(ctl.check(&pos, &bar(7, 50.0, 500.0, 1.0, 100.0)).is_none());
    }

    #[test]
    fn short_stop_is_capped_when_disabled() {
        let ctl = RiskController::new(RiskConfig {
            stop_loss_pct: 0.0,
            take_profit_pct: 0.0,
            max_holding_days: 0,
        });
        let (stop, target) = ctl.levels(Side::Short, 100.0);
        assert!((stop - 190.0).abs() < 1e-9);
        assert_eq!(target, 0.0);

        let pos = Position {
            stop_loss: stop,
            take_profit: target,
            ..position(Side::Short)
        };
        let exit = ctl.check(&pos, &bar(7, 150.0, 210.0, 150.0, 205.0)).unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert!((exit.price - 190.0).abs() < 1e-9);
    }

    #[test]
    fn time_stop_exits_at_close() {
        let ctl = RiskController::new(RiskConfig {
            max_holding_days: 10,
            ..RiskConfig::default()
        });
        let pos = position(Side::Long);
        assert!(ctl.check(&pos, &bar(15, 100.0, 101.0, 99.0, 100.0)).is_none());
        let exit = ctl.check(&pos, &bar(16, 100.0, 101.0, 99.0, 100.5)).unwrap();
        assert_eq!(exit.reason, ExitReason::TimeStop);
        assert!((exit.price - 100.5).abs() < 1e-9);
    }
}
