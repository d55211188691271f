//! Performance statistics over a finished run.

use std::collections::BTreeMap;

use super::portfolio::{EquityPoint, Portfolio};
use super::position::TradeRecord;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    /// Annualized stddev of per-point equity returns.
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of equity points below the previous peak.
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub total_commission: f64,
    pub total_tax: f64,
}

impl Metrics {
    pub fn compute(portfolio: &Portfolio, risk_free_rate: f64) -> Self {
        let curve = &portfolio.equity_curve;
        let initial = portfolio.initial_capital;

        let total_return = if initial > 0.0 {
            (portfolio.final_equity() - initial) / initial
        } else {
            0.0
        };
        let years = curve.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let returns = point_returns(curve);
        let (volatility, sharpe_ratio) = risk_adjusted(&returns, risk_free_rate);
        let (max_drawdown, max_drawdown_duration) = drawdown(curve);
        let trades = TradeStats::from_trades(&portfolio.trades);

        Metrics {
            total_return,
            annualized_return,
            volatility,
            sharpe_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades: trades.count,
            trades_won: trades.won,
            trades_lost: trades.lost,
            win_rate: trades.win_rate(),
            profit_factor: trades.profit_factor(),
            avg_win: trades.avg_win(),
            avg_loss: trades.avg_loss(),
            total_commission: trades.commission,
            total_tax: trades.tax,
        }
    }
}

#[derive(Debug, Default)]
struct TradeStats {
    count: usize,
    won: usize,
    lost: usize,
    gross_wins: f64,
    gross_losses: f64,
    commission: f64,
    tax: f64,
}

impl TradeStats {
    fn from_trades(trades: &[TradeRecord]) -> Self {
        trades.iter().fold(TradeStats::default(), |mut s, t| {
            s.count += 1;
            s.commission += t.commission;
            s.tax += t.tax;
            if t.net_pnl > 0.0 {
                s.won += 1;
                s.gross_wins += t.net_pnl;
            } else if t.net_pnl < 0.0 {
                s.lost += 1;
                s.gross_losses += -t.net_pnl;
            }
            s
        })
    }

    fn win_rate(&self) -> f64 {
        if self.count > 0 {
            self.won as f64 / self.count as f64
        } else {
            0.0
        }
    }

    fn profit_factor(&self) -> f64 {
        if self.gross_losses > 0.0 {
            self.gross_wins / self.gross_losses
        } else if self.gross_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    fn avg_win(&self) -> f64 {
        if self.won > 0 {
            self.gross_wins / self.won as f64
        } else {
            0.0
        }
    }

    fn avg_loss(&self) -> f64 {
        if self.lost > 0 {
            self.gross_losses / self.lost as f64
        } else {
            0.0
        }
    }
}

fn point_returns(curve: &[EquityPoint]) -> Vec<f64> {
    curve
        .windows(2)
        .map(|w| {
            if w[0].equity > 0.0 {
                (w[1].equity - w[0].equity) / w[0].equity
            } else {
                0.0
            }
        })
        .collect()
}

/// (annualized volatility, Sharpe ratio)
fn risk_adjusted(returns: &[f64], risk_free_rate: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let annual = TRADING_DAYS_PER_YEAR.sqrt();

    let sharpe = if stddev > 0.0 {
        (mean - risk_free_rate / TRADING_DAYS_PER_YEAR) / stddev * annual
    } else {
        0.0
    };
    (stddev * annual, sharpe)
}

/// (max drawdown fraction, longest underwater stretch in points)
fn drawdown(curve: &[EquityPoint]) -> (f64, usize) {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    let mut underwater = 0usize;
    let mut longest = 0usize;

    for point in curve {
        if point.equity >= peak {
            peak = point.equity;
            underwater = 0;
            continue;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
        }
        underwater += 1;
        longest = longest.max(underwater);
    }
    (max_dd, longest)
}

/// Per-symbol trade summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolResult {
    pub symbol: String,
    pub total_trades: usize,
    pub win_rate: f64,
    pub net_pnl: f64,
}

impl SymbolResult {
    pub fn compute_per_symbol(trades: &[TradeRecord]) -> Vec<SymbolResult> {
        let mut grouped: BTreeMap<&str, Vec<&TradeRecord>> = BTreeMap::new();
        for trade in trades {
            grouped.entry(trade.symbol.as_str()).or_default().push(trade);
        }
        grouped
            .into_iter()
            .map(|(symbol, trades)| {
                let won = trades.iter().filter(|t| t.is_win()).count();
                SymbolResult {
                    symbol: symbol.to_string(),
                    total_trades: trades.len(),
                    win_rate: won as f64 / trades.len() as f64,
                    net_pnl: trades.iter().map(|t| t.net_pnl).sum(),
                }
            })
            .collect()
    }
}
