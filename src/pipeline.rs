//! The result pipeline: producer-facing API plus the single dispatcher loop.
//!
//! Producers call in from any thread and return immediately. Exactly one thread runs
//! [`Pipeline::run`], which drains the event queue in FIFO order and drives the
//! [`Sampler`] once per iteration.
//!
//! Locking: the chart store, runtime statistics and log batcher each own one lock, and
//! no code path holds one of them while taking another. The attached algorithm handle is
//! cloned out of its slot before it is queried.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    algorithm::{Algorithm, Holding, SecurityType},
    charts::{
        Chart, ChartKind, ChartStore, SeriesKind, ASSET_CHART_PREFIX, ASSET_PRICE_SERIES,
        EQUITY_CHART, EQUITY_SERIES, PERFORMANCE_SERIES,
    },
    config::Settings,
    events::{Event, EventQueue},
    log_batcher::LogBatcher,
    notifier::Notifier,
    orders::{Order, OrderEvent},
    packet::{AlgorithmStatus, JobIds, LiveResult, LiveResultPacket},
    publisher,
    sampler::Sampler,
    statistics::RuntimeStatistics,
    store::ObjectStore,
};

pub struct Pipeline {
    settings: Settings,
    job: JobIds,
    queue: EventQueue,
    charts: ChartStore,
    statistics: RuntimeStatistics,
    logs: LogBatcher,
    algorithm: RwLock<Option<Arc<dyn Algorithm>>>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn ObjectStore>,
    exit_requested: AtomicBool,
    running: AtomicBool,
}

impl Pipeline {
    pub fn new(settings: Settings, notifier: Arc<dyn Notifier>, store: Arc<dyn ObjectStore>) -> Self {
        let job = settings.job();
        Self {
            settings,
            job,
            queue: EventQueue::new(),
            charts: ChartStore::new(),
            statistics: RuntimeStatistics::new(),
            logs: LogBatcher::new(),
            algorithm: RwLock::new(None),
            notifier,
            store,
            exit_requested: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn job(&self) -> &JobIds {
        &self.job
    }

    pub fn charts(&self) -> &ChartStore {
        &self.charts
    }

    pub fn statistics(&self) -> &RuntimeStatistics {
        &self.statistics
    }

    pub fn logs(&self) -> &LogBatcher {
        &self.logs
    }

    pub(crate) fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn algorithm(&self) -> Option<Arc<dyn Algorithm>> {
        self.algorithm.read().clone()
    }

    // ---- Charts ----

    pub fn sample(
        &self,
        chart_name: &str,
        chart_kind: ChartKind,
        series_name: &str,
        series_kind: SeriesKind,
        time: DateTime<Utc>,
        value: f64,
    ) {
        self.charts
            .sample(chart_name, chart_kind, series_name, series_kind, time, value);
    }

    pub fn sample_equity(&self, time: DateTime<Utc>, value: f64) {
        self.sample(EQUITY_CHART, ChartKind::Overlay, EQUITY_SERIES, SeriesKind::Line, time, value);
    }

    pub fn sample_performance(&self, time: DateTime<Utc>, value: f64) {
        self.sample(
            EQUITY_CHART,
            ChartKind::Overlay,
            PERFORMANCE_SERIES,
            SeriesKind::Bar,
            time,
            value,
        );
    }

    /// Samples only while `symbol` is inside its trading hours. Dropped when no algorithm
    /// is attached, since trading hours are unknown.
    pub fn sample_asset_price(&self, symbol: &str, time: DateTime<Utc>, value: f64) {
        let Some(algorithm) = self.algorithm() else {
            return;
        };
        if !algorithm.is_market_open(symbol, time) {
            return;
        }
        self.sample(
            &format!("{ASSET_CHART_PREFIX}{symbol}"),
            ChartKind::Overlay,
            ASSET_PRICE_SERIES,
            SeriesKind::Line,
            time,
            value,
        );
    }

    pub fn sample_range(&self, updates: Vec<Chart>) {
        self.charts.sample_range(updates);
    }

    // ---- Messages (capped) ----

    pub fn debug_message(&self, message: &str) {
        self.logs.append(message);
        self.queue.enqueue_capped(
            Event::Debug {
                job: self.job.clone(),
                message: message.to_string(),
            },
            self.settings.queue_soft_cap,
        );
    }

    pub fn log_message(&self, message: &str) {
        self.logs.append(message);
        self.queue.enqueue_capped(
            Event::Log {
                job: self.job.clone(),
                message: message.to_string(),
            },
            self.settings.queue_soft_cap,
        );
    }

    pub fn error_message(&self, message: &str, stack_trace: &str) {
        self.logs.append(message);
        self.queue.enqueue_capped(
            Event::RuntimeError {
                job: self.job.clone(),
                message: message.to_string(),
                stack_trace: stack_trace.to_string(),
            },
            self.settings.queue_soft_cap,
        );
    }

    /// Fatal error ahead of shutdown: drops whatever is queued so the viewer sees the error
    /// next, then enqueues it regardless of the cap.
    pub fn runtime_error(&self, message: &str, stack_trace: &str) {
        self.logs.append(message);
        self.purge_queue();
        self.queue.enqueue(Event::RuntimeError {
            job: self.job.clone(),
            message: message.to_string(),
            stack_trace: stack_trace.to_string(),
        });
    }

    // ---- Uncapped events ----

    pub fn security_types(&self, types: Vec<SecurityType>) {
        self.queue.enqueue(Event::SecurityTypes {
            job: self.job.clone(),
            types,
        });
    }

    pub fn send_status_update(&self, algorithm_id: &str, status: AlgorithmStatus, message: &str) {
        log::info!(
            "pipeline.status algorithm_id={} status={} message={}",
            algorithm_id,
            status.as_str(),
            message
        );
        self.queue.enqueue(Event::AlgorithmStatus {
            job: self.job.clone(),
            algorithm_id: algorithm_id.to_string(),
            status,
            message: message.to_string(),
        });
    }

    pub fn order_event(&self, event: OrderEvent) {
        self.queue.enqueue(Event::OrderEvent {
            job: self.job.clone(),
            event,
        });
    }

    /// Attaches the data source the sampler reads and announces its security types.
    pub fn set_algorithm(&self, algorithm: Arc<dyn Algorithm>) {
        let types = algorithm.security_types();
        *self.algorithm.write() = Some(algorithm);
        self.security_types(types);
    }

    pub fn runtime_statistic(&self, key: &str, value: &str) {
        self.statistics.set(key, value);
    }

    // ---- Lifecycle ----

    pub fn exit(&self) {
        self.exit_requested.store(true, Ordering::Release);
        self.queue.wake();
    }

    pub fn is_exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::Acquire)
    }

    pub fn purge_queue(&self) {
        let n = self.queue.clear();
        if n > 0 {
            log::warn!("pipeline.purge dropped={}", n);
        }
    }

    /// Persists the complete end-of-run result and today's log synchronously, then sends
    /// the viewer a copy with its result body cleared.
    pub fn send_final_result(
        &self,
        job: &JobIds,
        orders: Vec<Order>,
        profit_loss: BTreeMap<DateTime<Utc>, f64>,
        holdings: BTreeMap<String, Holding>,
        statistics: BTreeMap<String, String>,
        runtime: BTreeMap<String, String>,
    ) {
        let now = Utc::now();
        let results = LiveResult {
            charts: self.charts.snapshot(),
            orders,
            profit_loss,
            holdings,
            statistics,
            runtime_statistics: runtime,
        };
        let packet = LiveResultPacket::new(job.clone(), now, results);

        if let Err(e) = publisher::persist(self, &packet, false) {
            log::error!("final.persist_failed deploy_id={} err={:#}", job.deploy_id, e);
        }
        if let Err(e) = publisher::flush_logs(self, now, false) {
            log::error!("final.log_flush_failed deploy_id={} err={:#}", job.deploy_id, e);
        }
        if let Err(e) = self.notifier.live_result(&packet.without_results()) {
            log::error!("final.notify_failed deploy_id={} err={:#}", job.deploy_id, e);
        }
        log::info!("final.sent deploy_id={}", job.deploy_id);
    }

    // ---- Dispatcher ----

    /// Runs the dispatcher loop on the calling thread until `exit()` has been requested
    /// and the queue is drained. Errors only if a dispatcher is already running.
    pub fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            bail!("dispatcher already running for deploy {}", self.job.deploy_id);
        }
        log::info!("dispatch.start deploy_id={}", self.job.deploy_id);

        let idle = Duration::from_millis(self.settings.idle_wait_ms);
        let mut sampler = Sampler::new(&self.settings, Utc::now());
        let mut routed: u64 = 0;

        loop {
            if self.is_exit_requested() && self.queue.is_empty() {
                break;
            }
            if let Some(event) = self.queue.dequeue_timeout(idle) {
                self.route(event);
                routed += 1;
            }
            sampler.tick(Utc::now(), self);
        }

        self.running.store(false, Ordering::Release);
        log::info!(
            "dispatch.stop deploy_id={} routed={} dropped={}",
            self.job.deploy_id,
            routed,
            self.queue.dropped()
        );
        Ok(())
    }

    fn route(&self, event: Event) {
        let kind = event.kind();
        let n = self.notifier.as_ref();
        let res = match &event {
            Event::Debug { job, message } => n.debug_message(job, message),
            Event::Log { job, message } => n.log_message(job, message),
            Event::RuntimeError {
                job,
                message,
                stack_trace,
            } => n.runtime_error(job, message, stack_trace),
            Event::SecurityTypes { job, types } => n.security_types(job, types),
            Event::AlgorithmStatus {
                job,
                algorithm_id,
                status,
                message,
            } => n.algorithm_status(job, algorithm_id, *status, message),
            Event::OrderEvent { job, event } => n.order_event(job, event),
        };
        if let Err(e) = res {
            log::error!("dispatch.notify_failed kind={} err={:#}", kind, e);
        }
    }
}
