//! Open positions and closed trade records.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => f.write_str("LONG"),
            Side::Short => f.write_str("SHORT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    /// Always positive, a whole multiple of the lot size.
    pub quantity: i64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    /// 0 when disabled.
    pub stop_loss: f64,
    /// 0 when disabled.
    pub take_profit: f64,
    pub entry_commission: f64,
    pub entry_tax: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    pub fn is_short(&self) -> bool {
        self.side == Side::Short
    }

    pub fn entry_notional(&self) -> f64 {
        self.quantity as f64 * self.entry_price
    }

    /// Value the position contributes to equity at `price`.
    ///
    /// A short holds its entry notional in escrow, so its value is the escrow
    /// plus the unrealized P&L. It turns negative only above twice the entry
    /// price, which the short loss cap keeps out of reach except on a gap.
    pub fn market_value(&self, price: f64) -> f64 {
        let qty = self.quantity as f64;
        match self.side {
            Side::Long => qty * price,
            Side::Short => qty * (2.0 * self.entry_price - price),
        }
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        let qty = self.quantity as f64;
        match self.side {
            Side::Long => qty * (price - self.entry_price),
            Side::Short => qty * (self.entry_price - price),
        }
    }

    /// Split off `quantity` shares. Entry commission and tax are shared pro
    /// rata; the remainder is `None` when nothing is left.
    pub fn split(&self, quantity: i64) -> (Position, Option<Position>) {
        let share = quantity as f64 / self.quantity as f64;
        let taken = Position {
            quantity,
            entry_commission: self.entry_commission * share,
            entry_tax: self.entry_tax * share,
            ..self.clone()
        };
        let left = self.quantity - quantity;
        let rest = (left > 0).then(|| Position {
            quantity: left,
            entry_commission: self.entry_commission - taken.entry_commission,
            entry_tax: self.entry_tax - taken.entry_tax,
            ..self.clone()
        });
        (taken, rest)
    }

    pub fn holding_days(&self, date: NaiveDate) -> i64 {
        (date - self.entry_date).num_days()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
    TimeStop,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::Signal => "signal",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::TimeStop => "time_stop",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: Side,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: i64,
    pub gross_pnl: f64,
    /// Both legs.
    pub commission: f64,
    pub tax: f64,
    pub net_pnl: f64,
    pub exit_reason: ExitReason,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.net_pnl > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_long_position() -> Position {
        Position {
            symbol: "600036.SH".into(),
            side: Side::Long,
            quantity: 100,
            entry_price: 50.0,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            stop_loss: 45.0,
            take_profit: 60.0,
            entry_commission: 5.0,
            entry_tax: 0.0,
        }
    }

    fn sample_short_position() -> Position {
        Position {
            symbol: "000858.SZ".into(),
            side: Side::Short,
            quantity: 100,
            entry_price: 100.0,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            stop_loss: 110.0,
            take_profit: 80.0,
            entry_commission: 5.0,
            entry_tax: 10.0,
        }
    }

    #[test]
    fn side_predicates() {
        assert!(sample_long_position().is_long());
        assert!(!sample_long_position().is_short());
        assert!(sample_short_position().is_short());
    }

    #[test]
    fn market_value_long() {
        let pos = sample_long_position();
        assert!((pos.market_value(55.0) - 5500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn market_value_short_is_escrow_plus_pnl() {
        let pos = sample_short_position();
        // escrow 10000 + unrealized 500
        assert!((pos.market_value(95.0) - 10500.0).abs() < f64::EPSILON);
        assert!((pos.market_value(110.0) - 9000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unrealized_pnl_long() {
        let pos = sample_long_position();
        assert!((pos.unrealized_pnl(55.0) - 500.0).abs() < f64::EPSILON);
        assert!((pos.unrealized_pnl(45.0) + 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unrealized_pnl_short() {
        let pos = sample_short_position();
        assert!((pos.unrealized_pnl(90.0) - 1000.0).abs() < f64::EPSILON);
        assert!((pos.unrealized_pnl(110.0) + 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn holding_days_counts_calendar_days() {
        let pos = sample_long_position();
        let later = NaiveDate::from_ymd_opt(2024, 2, 14).unwrap();
        assert_eq!(pos.holding_days(later), 30);
    }

    #[test]
    fn trade_record_win() {
        let trade = TradeRecord {
            symbol: "600036.SH".into(),
            side: Side::Long,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            exit_date: NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(),
            entry_price: 50.0,
            exit_price: 55.0,
            quantity: 100,
            gross_pnl: 500.0,
            commission: 10.0,
            tax: 5.5,
            net_pnl: 484.5,
            exit_reason: ExitReason::Signal,
        };
        assert!(trade.is_win());
        assert_eq!(trade.exit_reason.to_string(), "signal");
        assert_eq!(trade.side.to_string(), "LONG");
    }
}
