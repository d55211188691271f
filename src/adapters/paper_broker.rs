//! Deterministic paper broker.
//!
//! Every order is acknowledged and filled in full at the caller's reference
//! price. Order ids count up from `ORD-000001`. No network I/O.

use chrono::NaiveDate;
use tracing::info;

use crate::domain::error::LivermoreError;
use crate::ports::broker_port::{BrokerPort, FillConfirmation};
use crate::ports::fill_port::OrderSide;

pub struct PaperBroker {
    next_order_id: u64,
    as_of: Option<NaiveDate>,
    confirmations: Vec<FillConfirmation>,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            next_order_id: 1,
            as_of: None,
            confirmations: Vec::new(),
        }
    }

    /// Stamp fills with a fixed date instead of the local calendar date.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.as_of = Some(date);
        self
    }

    pub fn confirmations(&self) -> &[FillConfirmation] {
        &self.confirmations
    }
}

impl BrokerPort for PaperBroker {
    fn submit_order(
        &mut self,
        symbol: &str,
        side: OrderSide,
        quantity: i64,
        reference_price: f64,
    ) -> Result<FillConfirmation, LivermoreError> {
        if quantity <= 0 {
            return Err(LivermoreError::OrderRejected {
                symbol: symbol.to_string(),
                reason: format!("non-positive quantity {quantity}"),
            });
        }
        if !reference_price.is_finite() || reference_price <= 0.0 {
            return Err(LivermoreError::OrderRejected {
                symbol: symbol.to_string(),
                reason: format!("no usable price ({reference_price})"),
            });
        }

        let order_id = format!("ORD-{:06}", self.next_order_id);
        self.next_order_id += 1;

        let confirmation = FillConfirmation {
            order_id,
            price: reference_price,
            quantity,
            date: self
                .as_of
                .unwrap_or_else(|| chrono::Local::now().date_naive()),
        };
        info!(
            order_id = %confirmation.order_id,
            symbol,
            side = %side,
            quantity,
            price = reference_price,
            "paper order filled"
        );
        self.confirmations.push(confirmation.clone());
        Ok(confirmation)
    }

    fn name(&self) -> &str {
        "paper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> PaperBroker {
        PaperBroker::new().with_date(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap())
    }

    #[test]
    fn ids_are_sequential() {
        let mut broker = broker();
        let a = broker.submit_order("AAPL", OrderSide::Buy, 100, 10.0).unwrap();
        let b = broker.submit_order("AAPL", OrderSide::Sell, 100, 11.0).unwrap();
        assert_eq!(a.order_id, "ORD-000001");
        assert_eq!(b.order_id, "ORD-000002");
        assert_eq!(broker.confirmations().len(), 2);
    }

    #[test]
    fn fills_at_reference_price() {
        let mut broker = broker();
        let fill = broker.submit_order("600519.SH", OrderSide::Buy, 300, 1688.5).unwrap();
        assert!((fill.price - 1688.5).abs() < f64::EPSILON);
        assert_eq!(fill.quantity, 300);
        assert_eq!(fill.date, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
    }

    #[test]
    fn rejects_bad_orders_without_consuming_ids() {
        let mut broker = broker();
        assert!(matches!(
            broker.submit_order("AAPL", OrderSide::Buy, 0, 10.0),
            Err(LivermoreError::OrderRejected { .. })
        ));
        assert!(broker.submit_order("AAPL", OrderSide::Buy, 100, f64::NAN).is_err());
        let ok = broker.submit_order("AAPL", OrderSide::Buy, 100, 10.0).unwrap();
        assert_eq!(ok.order_id, "ORD-000001");
        assert_eq!(broker.name(), "paper");
    }
}
