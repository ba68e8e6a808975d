use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::{
    algorithm::Algorithm,
    charts::EQUITY_CHART,
    config::Settings,
    orders::OrderDeltaTracker,
    packet::{LiveResult, LiveResultPacket},
    pipeline::Pipeline,
    publisher,
    utils::{millis, next_due, secs},
};

/// What a single tick did; mostly useful to tests and debug logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub update_sent: bool,
    pub equity_included: bool,
    pub persisted: bool,
    pub logs_flushed: bool,
}

/// Timer-gated snapshot driver, owned by the dispatcher thread.
///
/// Four independent "not before" thresholds: general update, equity chart inclusion,
/// full persisted snapshot and log flush. Each advances from the tick time that crossed it.
pub struct Sampler {
    update_period: Duration,
    equity_period: Duration,
    persist_period: Duration,
    log_flush_period: Duration,
    next_update: DateTime<Utc>,
    next_equity_update: DateTime<Utc>,
    next_persist: DateTime<Utc>,
    next_log_flush: DateTime<Utc>,
    orders: OrderDeltaTracker,
}

impl Sampler {
    /// All thresholds start due at `start`.
    pub fn new(settings: &Settings, start: DateTime<Utc>) -> Self {
        Self {
            update_period: millis(settings.update_interval_ms),
            equity_period: secs(settings.equity_update_interval_secs),
            persist_period: secs(settings.persist_interval_secs),
            log_flush_period: secs(settings.log_flush_interval_secs),
            next_update: start,
            next_equity_update: start,
            next_persist: start,
            next_log_flush: start,
            orders: OrderDeltaTracker::new(),
        }
    }

    pub fn tick(&mut self, now: DateTime<Utc>, p: &Pipeline) -> TickOutcome {
        let mut out = TickOutcome::default();

        // Algorithm not attached yet: nothing to sample this tick.
        let Some(algorithm) = p.algorithm() else {
            return out;
        };

        if now >= self.next_update {
            let include_equity = now >= self.next_equity_update;
            if include_equity {
                self.next_equity_update = next_due(now, self.equity_period);
            }
            if let Err(e) = self.send_update(now, p, algorithm.as_ref(), include_equity) {
                log::error!("sampler.update_failed err={:#}", e);
            }
            self.next_update = next_due(now, self.update_period);
            out.update_sent = true;
            out.equity_included = include_equity;
        }

        if now >= self.next_persist {
            if let Err(e) = self.persist_full(now, p, algorithm.as_ref()) {
                log::error!("sampler.persist_failed err={:#}", e);
            }
            self.next_persist = next_due(now, self.persist_period);
            out.persisted = true;
        }

        if now >= self.next_log_flush {
            match publisher::flush_logs(p, now, p.settings().store_async) {
                Ok(flushed) => out.logs_flushed = flushed,
                Err(e) => log::error!("sampler.log_flush_failed err={:#}", e),
            }
            self.next_log_flush = next_due(now, self.log_flush_period);
        }

        out
    }

    fn send_update(
        &mut self,
        now: DateTime<Utc>,
        p: &Pipeline,
        algorithm: &dyn Algorithm,
        include_equity: bool,
    ) -> Result<()> {
        let orders = self.orders.take_new(&algorithm.orders());
        let charts = p
            .charts()
            .take_updates(|name| include_equity || name != EQUITY_CHART);
        let portfolio = algorithm.portfolio();

        let results = LiveResult {
            charts,
            orders,
            holdings: publisher::holdings_by_symbol(&portfolio),
            runtime_statistics: p.statistics().banner(&portfolio),
            ..LiveResult::default()
        };
        publisher::publish_realtime(p, LiveResultPacket::new(p.job().clone(), now, results))
    }

    fn persist_full(&self, now: DateTime<Utc>, p: &Pipeline, algorithm: &dyn Algorithm) -> Result<()> {
        let mut orders = algorithm.orders();
        orders.sort_by_key(|o| o.id);
        let portfolio = algorithm.portfolio();

        let results = LiveResult {
            charts: p.charts().snapshot(),
            orders,
            profit_loss: algorithm.profit_loss(),
            holdings: publisher::holdings_by_symbol(&portfolio),
            statistics: algorithm.statistics(),
            runtime_statistics: p.statistics().banner(&portfolio),
        };
        let packet = LiveResultPacket::new(p.job().clone(), now, results);
        publisher::persist(p, &packet, p.settings().store_async)
    }
}
