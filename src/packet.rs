use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{algorithm::Holding, charts::Chart, orders::Order};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobIds {
    pub user_id: String,
    pub project_id: String,
    pub deploy_id: String,
    pub compile_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlgorithmStatus {
    Initializing,
    Running,
    Stopped,
    Liquidated,
    Completed,
    RuntimeError,
}

impl AlgorithmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmStatus::Initializing => "initializing",
            AlgorithmStatus::Running => "running",
            AlgorithmStatus::Stopped => "stopped",
            AlgorithmStatus::Liquidated => "liquidated",
            AlgorithmStatus::Completed => "completed",
            AlgorithmStatus::RuntimeError => "runtime_error",
        }
    }
}

/// Snapshot body. Holds deltas for realtime packets and complete state for persisted ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LiveResult {
    pub charts: Vec<Chart>,
    pub orders: Vec<Order>,
    pub profit_loss: BTreeMap<DateTime<Utc>, f64>,
    pub holdings: BTreeMap<String, Holding>,
    pub statistics: BTreeMap<String, String>,
    pub runtime_statistics: BTreeMap<String, String>,
}

impl LiveResult {
    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
            && self.orders.is_empty()
            && self.profit_loss.is_empty()
            && self.holdings.is_empty()
            && self.statistics.is_empty()
            && self.runtime_statistics.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveResultPacket {
    pub job: JobIds,
    pub time: DateTime<Utc>,
    pub results: LiveResult,
}

impl LiveResultPacket {
    pub fn new(job: JobIds, time: DateTime<Utc>, results: LiveResult) -> Self {
        Self { job, time, results }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn encoded_len(&self) -> Result<usize> {
        Ok(self.to_json()?.len())
    }

    /// Bounds the serialized packet to `max_bytes` by clearing bulk fields in order
    /// (charts, orders, holdings, profit/loss), then the whole result as a last resort.
    pub fn truncate_to(&mut self, max_bytes: usize) -> Result<bool> {
        if self.encoded_len()? <= max_bytes {
            return Ok(false);
        }
        let steps: [fn(&mut LiveResult); 4] = [
            |r| r.charts.clear(),
            |r| r.orders.clear(),
            |r| r.holdings.clear(),
            |r| r.profit_loss.clear(),
        ];
        for clear in steps {
            clear(&mut self.results);
            if self.encoded_len()? <= max_bytes {
                return Ok(true);
            }
        }
        self.results = LiveResult::default();
        Ok(true)
    }

    /// Copy with the result body cleared, used for the final realtime packet.
    pub fn without_results(&self) -> Self {
        Self {
            job: self.job.clone(),
            time: self.time,
            results: LiveResult::default(),
        }
    }
}
