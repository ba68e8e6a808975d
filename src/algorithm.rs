//! Read-only shape of the running algorithm, as consumed by the result pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orders::Order;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityType {
    Equity,
    Forex,
    Crypto,
    Future,
    Option,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub security_type: SecurityType,
    pub quantity: f64,
    pub average_price: f64,
    pub market_price: f64,
}

impl Holding {
    pub fn market_value(&self) -> f64 {
        self.quantity * self.market_price
    }

    pub fn unrealized_pnl(&self) -> f64 {
        (self.market_price - self.average_price) * self.quantity
    }
}

/// Point-in-time portfolio figures used for the derived banner statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSnapshot {
    pub starting_capital: f64,
    pub cash: f64,
    pub total_fees: f64,
    pub total_profit: f64,
    pub total_sale_volume: f64,
    pub holdings: Vec<Holding>,
}

impl PortfolioSnapshot {
    pub fn total_holdings_value(&self) -> f64 {
        self.holdings.iter().map(|h| h.market_value().abs()).sum()
    }

    pub fn total_unrealized_profit(&self) -> f64 {
        self.holdings.iter().map(Holding::unrealized_pnl).sum()
    }

    pub fn total_portfolio_value(&self) -> f64 {
        self.cash + self.holdings.iter().map(Holding::market_value).sum::<f64>()
    }

    pub fn net_profit(&self) -> f64 {
        self.total_profit - self.total_fees
    }

    pub fn total_return(&self) -> f64 {
        if self.starting_capital > 0.0 {
            (self.total_portfolio_value() - self.starting_capital) / self.starting_capital
        } else {
            0.0
        }
    }
}

/// Data source the sampler queries on every tick. Implementations must be cheap to call
/// from the dispatcher thread while the algorithm keeps running on its own threads.
pub trait Algorithm: Send + Sync {
    /// Every order in the ledger.
    fn orders(&self) -> Vec<Order>;

    fn portfolio(&self) -> PortfolioSnapshot;

    fn security_types(&self) -> Vec<SecurityType>;

    /// Whether `symbol` is inside its declared trading hours at `time`.
    fn is_market_open(&self, symbol: &str, time: DateTime<Utc>) -> bool;

    /// Closed-trade profit and loss keyed by close time.
    fn profit_loss(&self) -> BTreeMap<DateTime<Utc>, f64> {
        BTreeMap::new()
    }

    /// Headline statistics computed by the algorithm itself.
    fn statistics(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portfolio_figures() {
        let p = PortfolioSnapshot {
            starting_capital: 1000.0,
            cash: 500.0,
            total_fees: 2.0,
            total_profit: 12.0,
            total_sale_volume: 300.0,
            holdings: vec![
                Holding {
                    symbol: "SPY".to_string(),
                    security_type: SecurityType::Equity,
                    quantity: 2.0,
                    average_price: 250.0,
                    market_price: 260.0,
                },
                Holding {
                    symbol: "BTCUSD".to_string(),
                    security_type: SecurityType::Crypto,
                    quantity: -0.01,
                    average_price: 1000.0,
                    market_price: 900.0,
                },
            ],
        };
        assert!((p.total_unrealized_profit() - 21.0).abs() < 1e-9);
        assert!((p.total_holdings_value() - 529.0).abs() < 1e-9);
        assert!((p.total_portfolio_value() - 1011.0).abs() < 1e-9);
        assert!((p.net_profit() - 10.0).abs() < 1e-9);
        assert!((p.total_return() - 0.011).abs() < 1e-9);
    }
}
