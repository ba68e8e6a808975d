//! Simulated algorithm used by the binary: random-walk prices, market orders filled
//! immediately at the last price, long-only positions.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use parking_lot::Mutex;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::{
    algorithm::{Algorithm, Holding, PortfolioSnapshot, SecurityType},
    orders::{Order, OrderEvent, OrderStatus},
};

const STEP_VOLATILITY: f64 = 0.002;
const TRADE_PROBABILITY: f64 = 0.08;
const ORDER_NOTIONAL_FRACTION: f64 = 0.02;
const FEE_RATE: f64 = 0.001;

pub fn security_type_for(symbol: &str) -> SecurityType {
    if symbol.ends_with("USD") || symbol.ends_with("USDT") {
        SecurityType::Crypto
    } else {
        SecurityType::Equity
    }
}

/// Crypto trades around the clock; equities on weekdays 13:30-20:00 UTC.
pub fn market_open(security_type: SecurityType, time: DateTime<Utc>) -> bool {
    match security_type {
        SecurityType::Crypto => true,
        _ => {
            if matches!(time.weekday(), Weekday::Sat | Weekday::Sun) {
                return false;
            }
            let minute = time.hour() * 60 + time.minute();
            (13 * 60 + 30..20 * 60).contains(&minute)
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Position {
    qty: f64,
    avg_price: f64,
}

/// What one simulation step produced, for the driver to forward into the pipeline.
#[derive(Debug, Default)]
pub struct StepReport {
    pub prices: Vec<(String, f64)>,
    pub fills: Vec<OrderEvent>,
    pub equity: f64,
}

struct PaperState {
    rng: SmallRng,
    prices: BTreeMap<String, f64>,
    positions: BTreeMap<String, Position>,
    cash: f64,
    fees: f64,
    realized: f64,
    sale_volume: f64,
    wins: u64,
    losses: u64,
    next_order_id: u64,
    orders: Vec<Order>,
    profit_loss: BTreeMap<DateTime<Utc>, f64>,
}

pub struct PaperAlgorithm {
    starting_cash: f64,
    symbols: BTreeMap<String, SecurityType>,
    returns: Normal<f64>,
    state: Mutex<PaperState>,
}

impl PaperAlgorithm {
    pub fn new(symbols: &[String], starting_cash: f64, seed: u64) -> Result<Self> {
        let returns = Normal::new(0.0, STEP_VOLATILITY).context("return distribution")?;
        let symbols: BTreeMap<String, SecurityType> = symbols
            .iter()
            .map(|s| (s.clone(), security_type_for(s)))
            .collect();
        let prices = symbols
            .iter()
            .map(|(s, t)| {
                let p = if *t == SecurityType::Crypto { 30_000.0 } else { 100.0 };
                (s.clone(), p)
            })
            .collect();
        Ok(Self {
            starting_cash,
            symbols,
            returns,
            state: Mutex::new(PaperState {
                rng: SmallRng::seed_from_u64(seed),
                prices,
                positions: BTreeMap::new(),
                cash: starting_cash,
                fees: 0.0,
                realized: 0.0,
                sale_volume: 0.0,
                wins: 0,
                losses: 0,
                next_order_id: 1,
                orders: Vec::new(),
                profit_loss: BTreeMap::new(),
            }),
        })
    }

    /// Advances every open market by one random-walk step and maybe trades it.
    pub fn step(&self, now: DateTime<Utc>) -> StepReport {
        let mut st = self.state.lock();
        let mut report = StepReport::default();

        for (symbol, security_type) in &self.symbols {
            if !market_open(*security_type, now) {
                continue;
            }
            let r = self.returns.sample(&mut st.rng);
            let price = match st.prices.get_mut(symbol) {
                Some(p) => {
                    *p *= r.exp();
                    *p
                }
                None => continue,
            };
            report.prices.push((symbol.clone(), price));

            if !st.rng.random_bool(TRADE_PROBABILITY) {
                continue;
            }
            let held = st.positions.get(symbol).map(|p| p.qty).unwrap_or(0.0);
            let qty = if held > 0.0 && st.rng.random_bool(0.5) {
                -held
            } else {
                (st.cash * ORDER_NOTIONAL_FRACTION) / price
            };
            if let Some(event) = st.fill(symbol, qty, price, now) {
                report.fills.push(event);
            }
        }

        report.equity = st.equity(&self.snapshot_holdings(&st));
        report
    }

    fn snapshot_holdings(&self, st: &PaperState) -> Vec<Holding> {
        st.positions
            .iter()
            .filter(|(_, p)| p.qty != 0.0)
            .map(|(symbol, p)| Holding {
                symbol: symbol.clone(),
                security_type: self
                    .symbols
                    .get(symbol)
                    .copied()
                    .unwrap_or(SecurityType::Equity),
                quantity: p.qty,
                average_price: p.avg_price,
                market_price: st.prices.get(symbol).copied().unwrap_or(p.avg_price),
            })
            .collect()
    }
}

impl PaperState {
    fn equity(&self, holdings: &[Holding]) -> f64 {
        self.cash + holdings.iter().map(Holding::market_value).sum::<f64>()
    }

    fn fill(&mut self, symbol: &str, qty: f64, price: f64, now: DateTime<Utc>) -> Option<OrderEvent> {
        if qty.abs() < 1e-12 {
            return None;
        }
        let notional = qty.abs() * price;
        let fee = notional * FEE_RATE;
        if qty > 0.0 && notional + fee > self.cash {
            return None;
        }

        let id = self.next_order_id;
        self.next_order_id += 1;

        let pos = self.positions.entry(symbol.to_string()).or_default();
        if qty > 0.0 {
            let new_qty = pos.qty + qty;
            pos.avg_price = (pos.avg_price * pos.qty + price * qty) / new_qty;
            pos.qty = new_qty;
            self.cash -= notional + fee;
        } else {
            let close = (-qty).min(pos.qty);
            let gross = (price - pos.avg_price) * close;
            let pnl = gross - fee;
            pos.qty -= close;
            if pos.qty.abs() < 1e-12 {
                pos.qty = 0.0;
                pos.avg_price = 0.0;
            }
            self.cash += close * price - fee;
            self.realized += gross;
            self.sale_volume += close * price;
            if pnl >= 0.0 {
                self.wins += 1;
            } else {
                self.losses += 1;
            }
            *self.profit_loss.entry(now).or_insert(0.0) += pnl;
        }
        self.fees += fee;

        self.orders.push(Order {
            id,
            symbol: symbol.to_string(),
            quantity: qty,
            price,
            status: OrderStatus::Filled,
            time: now,
            tag: String::new(),
        });
        Some(OrderEvent {
            order_id: id,
            symbol: symbol.to_string(),
            status: OrderStatus::Filled,
            fill_price: price,
            fill_quantity: qty,
            time: now,
            message: String::new(),
        })
    }
}

impl Algorithm for PaperAlgorithm {
    fn orders(&self) -> Vec<Order> {
        self.state.lock().orders.clone()
    }

    fn portfolio(&self) -> PortfolioSnapshot {
        let st = self.state.lock();
        PortfolioSnapshot {
            starting_capital: self.starting_cash,
            cash: st.cash,
            total_fees: st.fees,
            total_profit: st.realized,
            total_sale_volume: st.sale_volume,
            holdings: self.snapshot_holdings(&st),
        }
    }

    fn security_types(&self) -> Vec<SecurityType> {
        let mut types: Vec<SecurityType> = self.symbols.values().copied().collect();
        types.sort();
        types.dedup();
        types
    }

    fn is_market_open(&self, symbol: &str, time: DateTime<Utc>) -> bool {
        self.symbols
            .get(symbol)
            .is_some_and(|t| market_open(*t, time))
    }

    fn profit_loss(&self) -> BTreeMap<DateTime<Utc>, f64> {
        self.state.lock().profit_loss.clone()
    }

    fn statistics(&self) -> BTreeMap<String, String> {
        let st = self.state.lock();
        let closed = st.wins + st.losses;
        let win_rate = if closed == 0 {
            0.0
        } else {
            st.wins as f64 / closed as f64 * 100.0
        };
        let mut out = BTreeMap::new();
        out.insert("Total Orders".to_string(), st.orders.len().to_string());
        out.insert("Winning Trades".to_string(), st.wins.to_string());
        out.insert("Losing Trades".to_string(), st.losses.to_string());
        out.insert("Win Rate".to_string(), format!("{win_rate:.0}%"));
        out
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn symbols() -> Vec<String> {
        vec!["BTCUSD".to_string(), "SPY".to_string()]
    }

    #[test]
    fn equity_hours_and_crypto_always_open() {
        let tue_open = Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap();
        let tue_early = Utc.with_ymd_and_hms(2024, 3, 5, 13, 29, 0).unwrap();
        let tue_close = Utc.with_ymd_and_hms(2024, 3, 5, 20, 0, 0).unwrap();
        let sat = Utc.with_ymd_and_hms(2024, 3, 9, 15, 0, 0).unwrap();

        assert!(market_open(SecurityType::Equity, tue_open));
        assert!(!market_open(SecurityType::Equity, tue_early));
        assert!(!market_open(SecurityType::Equity, tue_close));
        assert!(!market_open(SecurityType::Equity, sat));
        assert!(market_open(SecurityType::Crypto, sat));

        let algo = PaperAlgorithm::new(&symbols(), 100_000.0, 1).unwrap();
        assert!(algo.is_market_open("BTCUSD", sat));
        assert!(!algo.is_market_open("SPY", sat));
        assert!(!algo.is_market_open("QQQ", tue_open));
        assert_eq!(algo.security_types(), vec![SecurityType::Equity, SecurityType::Crypto]);
    }

    #[test]
    fn closed_markets_do_not_move_or_trade() {
        let algo = PaperAlgorithm::new(&symbols(), 100_000.0, 7).unwrap();
        let sat = Utc.with_ymd_and_hms(2024, 3, 9, 15, 0, 0).unwrap();
        for i in 0..200 {
            let report = algo.step(sat + chrono::Duration::seconds(i));
            assert!(report.prices.iter().all(|(s, _)| s == "BTCUSD"));
            assert!(report.fills.iter().all(|f| f.symbol == "BTCUSD"));
        }
    }

    #[test]
    fn order_ids_increase_and_books_balance() {
        let algo = PaperAlgorithm::new(&symbols(), 100_000.0, 42).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap();
        let mut last_equity = 0.0;
        for i in 0..2_000 {
            last_equity = algo.step(t + chrono::Duration::seconds(i)).equity;
        }

        let orders = algo.orders();
        assert!(!orders.is_empty());
        assert!(orders.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(orders[0].id, 1);

        let p = algo.portfolio();
        assert!(p.cash >= 0.0);
        assert!(p.holdings.iter().all(|h| h.quantity > 0.0));
        assert!((p.total_portfolio_value() - last_equity).abs() < 1e-6);
        let rebuilt = p.starting_capital + p.net_profit() + p.total_unrealized_profit();
        assert!((rebuilt - p.total_portfolio_value()).abs() < 1e-4);
    }
}
