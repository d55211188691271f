//! Position and portfolio ledger.
//!
//! Turns a resolved [`Decision`] into booked fills: sizes entries from
//! current equity and signal strength, charges commission and sell-side tax,
//! closes positions into [`TradeRecord`]s and marks the book to market.
//!
//! Cash is only touched after a fill is confirmed. A rejected order leaves
//! the book exactly as it was.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::domain::config::ExecutionConfig;
use crate::domain::error::LivermoreError;
use crate::domain::fills::apply_slippage;
use crate::domain::ohlcv::Bar;
use crate::domain::portfolio::Portfolio;
use crate::domain::position::{ExitReason, Position, Side, TradeRecord};
use crate::domain::risk::{ForcedExit, RiskController};
use crate::domain::signal::{Signal, SignalKind};
use crate::ports::fill_port::{FillPort, OrderRequest, OrderSide};

/// Final per-bar instruction after risk overrides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Hold,
    Enter { side: Side, strength: f64 },
    Exit { price: f64, reason: ExitReason },
}

impl Decision {
    /// Merge the signal with any forced exit. A forced exit replaces holds,
    /// entries and agreeing signal exits alike.
    pub fn resolve(signal: &Signal, forced: Option<ForcedExit>, close: f64) -> Decision {
        if let Some(exit) = forced {
            return Decision::Exit {
                price: exit.price,
                reason: exit.reason,
            };
        }
        match signal.kind {
            SignalKind::EnterLong => Decision::Enter {
                side: Side::Long,
                strength: signal.strength,
            },
            SignalKind::EnterShort => Decision::Enter {
                side: Side::Short,
                strength: signal.strength,
            },
            SignalKind::ExitLong | SignalKind::ExitShort => Decision::Exit {
                price: close,
                reason: ExitReason::Signal,
            },
            SignalKind::Hold => Decision::Hold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InsufficientCapital,
    ConflictingPosition,
    NoPosition,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::InsufficientCapital => "insufficient capital",
            SkipReason::ConflictingPosition => "position already open",
            SkipReason::NoPosition => "no open position",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Idle,
    Entered(Position),
    Exited(TradeRecord),
    Skipped(SkipReason),
    /// The fill port refused the order; nothing was booked.
    Rejected { side: OrderSide, quantity: i64, reason: String },
}

pub struct Ledger {
    portfolio: Portfolio,
    execution: ExecutionConfig,
    risk: RiskController,
    last_prices: HashMap<String, f64>,
}

impl Ledger {
    pub fn new(initial_capital: f64, execution: ExecutionConfig, risk: RiskController) -> Self {
        Ledger {
            portfolio: Portfolio::new(initial_capital),
            execution,
            risk,
            last_prices: HashMap::new(),
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn into_portfolio(self) -> Portfolio {
        self.portfolio
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.portfolio.get_position(symbol)
    }

    pub fn risk(&self) -> &RiskController {
        &self.risk
    }

    /// Equity at the latest known prices.
    pub fn equity(&self) -> f64 {
        self.portfolio.total_equity(&self.last_prices)
    }

    pub fn commission(&self, notional: f64) -> f64 {
        (notional * self.execution.commission_rate).max(self.execution.min_commission)
    }

    /// Cash needed to open `quantity` at `price`. Shorts pay the sell-leg tax
    /// up front and escrow the notional.
    fn entry_cost(&self, side: Side, quantity: i64, price: f64) -> (f64, f64, f64) {
        let notional = quantity as f64 * price;
        let commission = self.commission(notional);
        let tax = match side {
            Side::Long => 0.0,
            Side::Short => notional * self.execution.tax_rate,
        };
        (notional, commission, tax)
    }

    pub fn apply(
        &mut self,
        decision: &Decision,
        bar: &Bar,
        fills: &mut dyn FillPort,
    ) -> Result<ApplyOutcome, LivermoreError> {
        if !(bar.close.is_finite() && bar.close > 0.0) {
            return Err(LivermoreError::DataSource {
                reason: format!("{} {}: non-positive close {}", bar.symbol, bar.date, bar.close),
            });
        }
        self.last_prices.insert(bar.symbol.clone(), bar.close);

        match *decision {
            Decision::Hold => Ok(ApplyOutcome::Idle),
            Decision::Enter { side, strength } => Ok(self.enter(side, strength, bar, fills)),
            Decision::Exit { price, reason } => Ok(self.exit(price, reason, bar, fills)),
        }
    }

    fn enter(
        &mut self,
        side: Side,
        strength: f64,
        bar: &Bar,
        fills: &mut dyn FillPort,
    ) -> ApplyOutcome {
        if self.portfolio.has_position(&bar.symbol) {
            debug!(symbol = %bar.symbol, date = %bar.date, "entry skipped: position already open");
            return ApplyOutcome::Skipped(SkipReason::ConflictingPosition);
        }

        let lot = self.execution.lot_size.max(1);
        let target = self.equity()
            * self.execution.position_fraction
            * (0.5 + 0.5 * strength.clamp(0.0, 1.0));
        let estimate = apply_slippage(bar.close, OrderSide::Buy, self.execution.slippage_pct);
        let lots = (target / (estimate * lot as f64)).floor() as i64;
        let quantity = lots * lot;

        let (notional, commission, tax) = self.entry_cost(side, quantity, estimate);
        if quantity <= 0 || notional + commission + tax > self.portfolio.cash {
            debug!(
                symbol = %bar.symbol,
                date = %bar.date,
                quantity,
                cash = self.portfolio.cash,
                "entry skipped: insufficient capital"
            );
            return ApplyOutcome::Skipped(SkipReason::InsufficientCapital);
        }

        let order_side = match side {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        };
        let order = OrderRequest {
            symbol: bar.symbol.clone(),
            side: order_side,
            quantity,
            reference_price: bar.close,
            date: bar.date,
        };
        let fill = match fills.fill(&order) {
            Ok(fill) if fill.quantity > 0 && fill.quantity % lot == 0 => fill,
            Ok(fill) => {
                return self.rejected(&order, format!("unusable fill quantity {}", fill.quantity));
            }
            Err(e) => return self.rejected(&order, e.to_string()),
        };

        let (notional, commission, tax) = self.entry_cost(side, fill.quantity, fill.price);
        let cost = notional + commission + tax;
        if cost > self.portfolio.cash {
            warn!(symbol = %bar.symbol, cost, cash = self.portfolio.cash, "confirmed fill exceeds cash");
        }
        self.portfolio.cash -= cost;

        let (stop_loss, take_profit) = self.risk.levels(side, fill.price);
        let position = Position {
            symbol: bar.symbol.clone(),
            side,
            quantity: fill.quantity,
            entry_price: fill.price,
            entry_date: fill.date,
            stop_loss,
            take_profit,
            entry_commission: commission,
            entry_tax: tax,
        };
        info!(
            symbol = %position.symbol,
            date = %position.entry_date,
            side = %side,
            quantity = position.quantity,
            price = position.entry_price,
            strength,
            "position opened"
        );
        self.portfolio.add_position(position.clone());
        ApplyOutcome::Entered(position)
    }

    fn exit(
        &mut self,
        price: f64,
        reason: ExitReason,
        bar: &Bar,
        fills: &mut dyn FillPort,
    ) -> ApplyOutcome {
        let Some(position) = self.portfolio.get_position(&bar.symbol).cloned() else {
            debug!(symbol = %bar.symbol, date = %bar.date, "exit skipped: no open position");
            return ApplyOutcome::Skipped(SkipReason::NoPosition);
        };

        let order = OrderRequest {
            symbol: position.symbol.clone(),
            side: match position.side {
                Side::Long => OrderSide::Sell,
                Side::Short => OrderSide::Buy,
            },
            quantity: position.quantity,
            reference_price: price,
            date: bar.date,
        };
        let lot = self.execution.lot_size.max(1);
        let fill = match fills.fill(&order) {
            Ok(fill)
                if fill.quantity > 0
                    && fill.quantity <= position.quantity
                    && fill.quantity % lot == 0 =>
            {
                fill
            }
            Ok(fill) => {
                return self.rejected(
                    &order,
                    format!(
                        "unusable fill quantity {} for {} held",
                        fill.quantity, position.quantity
                    ),
                );
            }
            Err(e) => return self.rejected(&order, e.to_string()),
        };

        let (position, remainder) = position.split(fill.quantity);
        if let Some(rest) = &remainder {
            warn!(
                symbol = %position.symbol,
                confirmed = fill.quantity,
                remaining = rest.quantity,
                "partial exit; remainder stays open"
            );
        }

        let qty = position.quantity as f64;
        let exit_notional = qty * fill.price;
        let exit_commission = self.commission(exit_notional);
        let exit_tax = match position.side {
            Side::Long => exit_notional * self.execution.tax_rate,
            Side::Short => 0.0,
        };
        let gross_pnl = position.unrealized_pnl(fill.price);
        let proceeds = match position.side {
            Side::Long => exit_notional - exit_commission - exit_tax,
            Side::Short => position.entry_notional() + gross_pnl - exit_commission,
        };
        self.portfolio.cash += proceeds;

        let commission = position.entry_commission + exit_commission;
        let tax = position.entry_tax + exit_tax;
        let trade = TradeRecord {
            symbol: position.symbol.clone(),
            side: position.side,
            entry_date: position.entry_date,
            exit_date: fill.date,
            entry_price: position.entry_price,
            exit_price: fill.price,
            quantity: position.quantity,
            gross_pnl,
            commission,
            tax,
            net_pnl: gross_pnl - commission - tax,
            exit_reason: reason,
        };
        info!(
            symbol = %trade.symbol,
            date = %trade.exit_date,
            reason = %reason,
            price = trade.exit_price,
            net_pnl = trade.net_pnl,
            "position closed"
        );
        self.portfolio.remove_position(&position.symbol);
        if let Some(rest) = remainder {
            self.portfolio.add_position(rest);
        }
        self.portfolio.record_trade(trade.clone());
        ApplyOutcome::Exited(trade)
    }

    fn rejected(&self, order: &OrderRequest, reason: String) -> ApplyOutcome {
        warn!(
            symbol = %order.symbol,
            side = %order.side,
            quantity = order.quantity,
            %reason,
            "order rejected"
        );
        ApplyOutcome::Rejected {
            side: order.side,
            quantity: order.quantity,
            reason,
        }
    }

    /// Append one equity point valued at the latest known closes.
    pub fn mark_to_market(&mut self, date: NaiveDate) -> f64 {
        let equity = self.equity();
        self.portfolio.record_equity(date, equity);
        equity
    }
}
