//! Daily OHLCV bar.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// Close-to-close return against the previous close; 0 when undefined.
    pub fn return_from(&self, prev_close: f64) -> f64 {
        if prev_close > 0.0 {
            (self.close - prev_close) / prev_close
        } else {
            0.0
        }
    }

    /// Relative volume change against the previous bar; 0 when undefined.
    pub fn volume_change_from(&self, prev_volume: f64) -> f64 {
        if prev_volume > 0.0 {
            (self.volume as f64 - prev_volume) / prev_volume
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar {
            symbol: "000001.SZ".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            open: 10.0,
            high: 11.0,
            low: 9.5,
            close: 10.5,
            volume: 150_000,
        }
    }

    #[test]
    fn return_from_previous_close() {
        let bar = sample_bar();
        assert!((bar.return_from(10.0) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn return_from_zero_close_is_zero() {
        assert_eq!(sample_bar().return_from(0.0), 0.0);
    }

    #[test]
    fn volume_change() {
        let bar = sample_bar();
        assert!((bar.volume_change_from(100_000.0) - 0.5).abs() < 1e-12);
        assert_eq!(bar.volume_change_from(0.0), 0.0);
    }
}
