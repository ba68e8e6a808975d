use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::{
    algorithm::{Holding, PortfolioSnapshot},
    log_batcher::render_lines,
    packet::LiveResultPacket,
    pipeline::Pipeline,
    store::{log_key, result_key, StoragePermission},
};

pub fn holdings_by_symbol(portfolio: &PortfolioSnapshot) -> BTreeMap<String, Holding> {
    portfolio
        .holdings
        .iter()
        .map(|h| (h.symbol.clone(), h.clone()))
        .collect()
}

/// Sends a realtime packet, first bounding it to the configured size.
pub fn publish_realtime(p: &Pipeline, mut packet: LiveResultPacket) -> Result<()> {
    let max = p.settings().realtime_max_bytes;
    if packet.truncate_to(max)? {
        log::warn!(
            "publisher.truncated deploy_id={} max_bytes={}",
            packet.job.deploy_id,
            max
        );
    }
    p.notifier().live_result(&packet)
}

/// Writes the untruncated packet under the day's result key.
pub fn persist(p: &Pipeline, packet: &LiveResultPacket, run_async: bool) -> Result<()> {
    let key = result_key(&packet.job, packet.time.date_naive());
    let payload = packet.to_json()?;
    log::debug!("publisher.persist key={} bytes={}", key, payload.len());
    p.store().store(payload, &key, StoragePermission::Private, run_async)
}

/// Persists today's buffered log lines and purges other dates. Returns whether a batch was
/// handed to the store.
pub fn flush_logs(p: &Pipeline, now: DateTime<Utc>, run_async: bool) -> Result<bool> {
    let today = now.date_naive();
    let Some(entries) = p.logs().take_for_flush(today) else {
        return Ok(false);
    };
    let key = log_key(p.job(), today);
    p.store().store(
        render_lines(&entries).into_bytes(),
        &key,
        StoragePermission::Private,
        run_async,
    )?;
    Ok(true)
}
