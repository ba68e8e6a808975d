//! Fakes shared by the unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::{
    algorithm::{Algorithm, Holding, PortfolioSnapshot, SecurityType},
    config::Settings,
    notifier::Notifier,
    orders::{Order, OrderStatus},
    packet::{AlgorithmStatus, JobIds, LiveResultPacket},
    pipeline::Pipeline,
    store::{ObjectStore, StoragePermission},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Debug(String),
    Log(String),
    RuntimeError(String, String),
    SecurityTypes(Vec<SecurityType>),
    Status(String, AlgorithmStatus, String),
    Result(LiveResultPacket),
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn record(&self, s: Sent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("notifier offline");
        }
        self.sent.lock().push(s);
        Ok(())
    }
}

impl Notifier for RecordingNotifier {
    fn debug_message(&self, _job: &JobIds, message: &str) -> Result<()> {
        self.record(Sent::Debug(message.to_string()))
    }

    fn log_message(&self, _job: &JobIds, message: &str) -> Result<()> {
        self.record(Sent::Log(message.to_string()))
    }

    fn runtime_error(&self, _job: &JobIds, message: &str, stack_trace: &str) -> Result<()> {
        self.record(Sent::RuntimeError(message.to_string(), stack_trace.to_string()))
    }

    fn security_types(&self, _job: &JobIds, types: &[SecurityType]) -> Result<()> {
        self.record(Sent::SecurityTypes(types.to_vec()))
    }

    fn algorithm_status(
        &self,
        _job: &JobIds,
        algorithm_id: &str,
        status: AlgorithmStatus,
        message: &str,
    ) -> Result<()> {
        self.record(Sent::Status(algorithm_id.to_string(), status, message.to_string()))
    }

    fn live_result(&self, packet: &LiveResultPacket) -> Result<()> {
        self.record(Sent::Result(packet.clone()))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    writes: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    pub fn writes_for(&self, key: &str) -> usize {
        self.writes.lock().iter().filter(|k| *k == key).count()
    }

    pub fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }
}

impl ObjectStore for MemoryStore {
    fn store(&self, payload: Vec<u8>, key: &str, _permission: StoragePermission, _run_async: bool) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("store offline");
        }
        self.writes.lock().push(key.to_string());
        self.objects.lock().insert(key.to_string(), payload);
        Ok(())
    }
}

pub struct FixedAlgorithm {
    orders: Mutex<Vec<Order>>,
    portfolio: Mutex<PortfolioSnapshot>,
    market_open: AtomicBool,
}

impl FixedAlgorithm {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(Vec::new()),
            portfolio: Mutex::new(PortfolioSnapshot {
                starting_capital: 100_000.0,
                cash: 99_000.0,
                holdings: vec![Holding {
                    symbol: "SPY".to_string(),
                    security_type: SecurityType::Equity,
                    quantity: 2.0,
                    average_price: 500.0,
                    market_price: 505.0,
                }],
                ..PortfolioSnapshot::default()
            }),
            market_open: AtomicBool::new(true),
        }
    }

    pub fn push_order(&self, order: Order) {
        self.orders.lock().push(order);
    }

    pub fn set_market_open(&self, open: bool) {
        self.market_open.store(open, Ordering::SeqCst);
    }
}

impl Algorithm for FixedAlgorithm {
    fn orders(&self) -> Vec<Order> {
        self.orders.lock().clone()
    }

    fn portfolio(&self) -> PortfolioSnapshot {
        self.portfolio.lock().clone()
    }

    fn security_types(&self) -> Vec<SecurityType> {
        vec![SecurityType::Equity, SecurityType::Crypto]
    }

    fn is_market_open(&self, _symbol: &str, _time: DateTime<Utc>) -> bool {
        self.market_open.load(Ordering::SeqCst)
    }
}

pub fn order(id: u64) -> Order {
    Order {
        id,
        symbol: "SPY".to_string(),
        quantity: 1.0,
        price: 500.0,
        status: OrderStatus::Filled,
        time: Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap(),
        tag: String::new(),
    }
}

pub fn test_settings() -> Settings {
    Settings {
        user_id: "7".to_string(),
        project_id: "42".to_string(),
        deploy_id: "L-test".to_string(),
        compile_id: "C-test".to_string(),
        store_async: false,
        ..Settings::default()
    }
}

pub fn test_pipeline(settings: Settings) -> (Pipeline, Arc<RecordingNotifier>, Arc<MemoryStore>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(MemoryStore::default());
    let p = Pipeline::new(settings, notifier.clone(), store.clone());
    (p, notifier, store)
}
