//! Order fill port shared by simulated and brokered execution.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::error::LivermoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("BUY"),
            OrderSide::Sell => f.write_str("SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    /// Price the decision was made at; simulated fills derive from it.
    pub reference_price: f64,
    pub date: NaiveDate,
}

/// A confirmed execution. The ledger books these values, never the request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64,
    pub quantity: i64,
    pub date: NaiveDate,
}

pub trait FillPort {
    fn fill(&mut self, order: &OrderRequest) -> Result<Fill, LivermoreError>;
}
