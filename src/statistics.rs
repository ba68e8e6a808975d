use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::algorithm::PortfolioSnapshot;

/// Headline banner values, last write wins per key.
#[derive(Default)]
pub struct RuntimeStatistics {
    inner: Mutex<BTreeMap<String, String>>,
}

impl RuntimeStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.inner.lock().insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().get(key).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner.lock().clone()
    }

    /// Registry copy plus figures derived from `portfolio`. Derived keys overwrite
    /// producer-set keys of the same name in the copy only; the registry is untouched.
    pub fn banner(&self, portfolio: &PortfolioSnapshot) -> BTreeMap<String, String> {
        let mut out = self.snapshot();
        out.extend(derived_figures(portfolio));
        out
    }
}

pub fn derived_figures(p: &PortfolioSnapshot) -> BTreeMap<String, String> {
    let mut m = BTreeMap::new();
    m.insert("Unrealized".to_string(), money(p.total_unrealized_profit()));
    m.insert("Fees".to_string(), money(-p.total_fees));
    m.insert("Net Profit".to_string(), money(p.net_profit()));
    m.insert("Return".to_string(), format!("{:.2} %", p.total_return() * 100.0));
    m.insert("Equity".to_string(), money(p.total_portfolio_value()));
    m.insert("Holdings".to_string(), money(p.total_holdings_value()));
    m.insert("Volume".to_string(), money(p.total_sale_volume));
    m
}

fn money(v: f64) -> String {
    if v < 0.0 {
        format!("-${:.2}", -v)
    } else {
        format!("${:.2}", v)
    }
}
