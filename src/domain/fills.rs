//! `FillPort` implementations: slippage-modelled simulation and a broker
//! adapter for live order routing.

use tracing::debug;

use crate::domain::error::LivermoreError;
use crate::ports::broker_port::BrokerPort;
use crate::ports::fill_port::{Fill, FillPort, OrderRequest, OrderSide};

/// Fills every order in full at the reference price moved against the trader
/// by `slippage_pct`.
#[derive(Debug, Clone, Default)]
pub struct SimulatedFills {
    slippage_pct: f64,
}

impl SimulatedFills {
    pub fn new(slippage_pct: f64) -> Self {
        SimulatedFills { slippage_pct }
    }
}

pub fn apply_slippage(price: f64, side: OrderSide, slippage_pct: f64) -> f64 {
    match side {
        OrderSide::Buy => price * (1.0 + slippage_pct),
        OrderSide::Sell => price * (1.0 - slippage_pct),
    }
}

impl FillPort for SimulatedFills {
    fn fill(&mut self, order: &OrderRequest) -> Result<Fill, LivermoreError> {
        if order.quantity <= 0 {
            return Err(LivermoreError::OrderRejected {
                symbol: order.symbol.clone(),
                reason: format!("non-positive quantity {}", order.quantity),
            });
        }
        Ok(Fill {
            price: apply_slippage(order.reference_price, order.side, self.slippage_pct),
            quantity: order.quantity,
            date: order.date,
        })
    }
}

/// Routes orders to a broker and books whatever it confirms.
pub struct BrokerFills<B: BrokerPort> {
    broker: B,
}

impl<B: BrokerPort> BrokerFills<B> {
    pub fn new(broker: B) -> Self {
        BrokerFills { broker }
    }
}

impl<B: BrokerPort> FillPort for BrokerFills<B> {
    fn fill(&mut self, order: &OrderRequest) -> Result<Fill, LivermoreError> {
        let confirmation = self.broker.submit_order(
            &order.symbol,
            order.side,
            order.quantity,
            order.reference_price,
        )?;
        debug!(
            broker = self.broker.name(),
            order_id = %confirmation.order_id,
            symbol = %order.symbol,
            price = confirmation.price,
            quantity = confirmation.quantity,
            "order confirmed"
        );
        Ok(Fill {
            price: confirmation.price,
            quantity: confirmation.quantity,
            date: confirmation.date,
        })
    }
}
