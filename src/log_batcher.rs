use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn line(&self) -> String {
        format!("{} {}", self.time.format("%Y-%m-%d %H:%M:%S"), self.message)
    }
}

/// Calendar date (UTC) -> lines produced on that date.
#[derive(Default)]
pub struct LogBatcher {
    inner: Mutex<BTreeMap<NaiveDate, Vec<LogEntry>>>,
}

impl LogBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, message: &str) {
        self.append_at(Utc::now(), message);
    }

    pub fn append_at(&self, time: DateTime<Utc>, message: &str) {
        self.inner
            .lock()
            .entry(time.date_naive())
            .or_default()
            .push(LogEntry {
                time,
                message: message.to_string(),
            });
    }

    /// Copies `today`'s bucket for persistence and drops every earlier date.
    ///
    /// Today's bucket stays in place so each flush persists the whole day under the same
    /// daily key. Earlier dates are purged even if the caller later fails to persist. Later
    /// dates survive: a producer may already have crossed midnight while `today` was
    /// captured before it.
    pub fn take_for_flush(&self, today: NaiveDate) -> Option<Vec<LogEntry>> {
        let mut buckets = self.inner.lock();
        buckets.retain(|date, _| *date >= today);
        buckets.get(&today).filter(|v| !v.is_empty()).cloned()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.inner.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn render_lines(entries: &[LogEntry]) -> String {
    let mut out = String::new();
    for e in entries {
        out.push_str(&e.line());
        out.push('\n');
    }
    out
}
