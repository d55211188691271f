//! Brokerage order submission port used in live mode.

use chrono::NaiveDate;

use crate::domain::error::LivermoreError;
use crate::ports::fill_port::OrderSide;

#[derive(Debug, Clone, PartialEq)]
pub struct FillConfirmation {
    pub order_id: String,
    pub price: f64,
    pub quantity: i64,
    pub date: NaiveDate,
}

pub trait BrokerPort {
    /// Submit a market order. `reference_price` is the last price the caller
    /// saw; brokers are free to ignore it.
    fn submit_order(
        &mut self,
        symbol: &str,
        side: OrderSide,
        quantity: i64,
        reference_price: f64,
    ) -> Result<FillConfirmation, LivermoreError>;

    fn name(&self) -> &str;
}
