use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const EQUITY_CHART: &str = "Strategy Equity";
pub const EQUITY_SERIES: &str = "Equity";
pub const PERFORMANCE_SERIES: &str = "Daily Performance";
pub const ASSET_CHART_PREFIX: &str = "Stockplot: ";
pub const ASSET_PRICE_SERIES: &str = "Price";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChartKind {
    Overlay,
    Stacked,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SeriesKind {
    Line,
    Scatter,
    Candle,
    Bar,
    Flag,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChartPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Series {
    pub name: String,
    pub kind: SeriesKind,
    pub points: Vec<ChartPoint>,
    // Index of the first point not yet handed out as a delta.
    #[serde(skip)]
    cursor: usize,
}

impl Series {
    pub fn new(name: &str, kind: SeriesKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            points: Vec::new(),
            cursor: 0,
        }
    }

    pub fn push(&mut self, time: DateTime<Utc>, value: f64) {
        self.points.push(ChartPoint { time, value });
    }

    /// Copies the points appended since the previous call, then advances the cursor.
    pub fn take_updates(&mut self) -> Series {
        let start = self.cursor.min(self.points.len());
        let points = self.points[start..].to_vec();
        self.cursor = self.points.len();
        Series {
            name: self.name.clone(),
            kind: self.kind,
            points,
            cursor: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.points.len().saturating_sub(self.cursor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chart {
    pub name: String,
    pub kind: ChartKind,
    pub series: BTreeMap<String, Series>,
}

impl Chart {
    pub fn new(name: &str, kind: ChartKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            series: BTreeMap::new(),
        }
    }

    pub fn series_mut(&mut self, name: &str, kind: SeriesKind) -> &mut Series {
        self.series
            .entry(name.to_string())
            .or_insert_with(|| Series::new(name, kind))
    }

    /// Chart holding only the series that gained points since the last delta,
    /// or `None` when nothing is new. Advances every series cursor.
    pub fn take_updates(&mut self) -> Option<Chart> {
        let mut out = Chart::new(&self.name, self.kind);
        for (name, s) in self.series.iter_mut() {
            let delta = s.take_updates();
            if !delta.points.is_empty() {
                out.series.insert(name.clone(), delta);
            }
        }
        if out.series.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    fn merge(&mut self, other: Chart) {
        for (name, incoming) in other.series {
            self.series_mut(&name, incoming.kind)
                .points
                .extend(incoming.points);
        }
    }

    pub fn point_count(&self) -> usize {
        self.series.values().map(|s| s.points.len()).sum()
    }
}

/// Chart name -> chart, behind a single lock.
///
/// Points are never pruned; growth over a long run is unbounded.
pub struct ChartStore {
    inner: Mutex<BTreeMap<String, Chart>>,
}

impl Default for ChartStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn sample(
        &self,
        chart_name: &str,
        chart_kind: ChartKind,
        series_name: &str,
        series_kind: SeriesKind,
        time: DateTime<Utc>,
        value: f64,
    ) {
        let mut charts = self.inner.lock();
        charts
            .entry(chart_name.to_string())
            .or_insert_with(|| Chart::new(chart_name, chart_kind))
            .series_mut(series_name, series_kind)
            .push(time, value);
    }

    /// Merges externally produced chart fragments, creating charts and series as needed.
    pub fn sample_range(&self, updates: Vec<Chart>) {
        let mut charts = self.inner.lock();
        for update in updates {
            charts
                .entry(update.name.clone())
                .or_insert_with(|| Chart::new(&update.name, update.kind))
                .merge(update);
        }
    }

    /// Destructive delta read: returns points added since the previous call for every chart
    /// accepted by `include`, and advances those charts' cursors. Charts rejected by
    /// `include` keep their cursor, so their points surface on a later call.
    ///
    /// Only the dispatcher thread may call this; two concurrent callers would split deltas.
    pub fn take_updates<F>(&self, include: F) -> Vec<Chart>
    where
        F: Fn(&str) -> bool,
    {
        let mut charts = self.inner.lock();
        charts
            .values_mut()
            .filter(|c| include(&c.name))
            .filter_map(|c| c.take_updates())
            .collect()
    }

    /// Full copy of every chart. Does not touch delta cursors.
    pub fn snapshot(&self) -> Vec<Chart> {
        self.inner.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn delta_points(charts: &[Chart]) -> usize {
        charts.iter().map(|c| c.point_count()).sum()
    }

    #[test]
    fn lazily_creates_chart_and_series_once() {
        let store = ChartStore::new();
        store.sample("Custom", ChartKind::Overlay, "A", SeriesKind::Line, t(0), 1.0);
        store.sample("Custom", ChartKind::Stacked, "A", SeriesKind::Bar, t(1), 2.0);
        store.sample("Custom", ChartKind::Overlay, "B", SeriesKind::Scatter, t(2), 3.0);

        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        let chart = &snap[0];
        assert_eq!(chart.kind, ChartKind::Overlay);
        assert_eq!(chart.series.len(), 2);
        assert_eq!(chart.series["A"].kind, SeriesKind::Line);
        assert_eq!(chart.series["A"].points.len(), 2);
    }

    #[test]
    fn delta_returns_new_points_exactly_once() {
        let store = ChartStore::new();
        for i in 0..3 {
            store.sample("Custom", ChartKind::Overlay, "A", SeriesKind::Line, t(i), i as f64);
        }

        let first = store.take_updates(|_| true);
        assert_eq!(delta_points(&first), 3);
        assert_eq!(first[0].series["A"].points[2].value, 2.0);

        let second = store.take_updates(|_| true);
        assert!(second.is_empty());

        // Full snapshot still has everything.
        assert_eq!(store.snapshot()[0].point_count(), 3);
    }

    #[test]
    fn excluded_chart_keeps_its_pending_points() {
        let store = ChartStore::new();
        store.sample(EQUITY_CHART, ChartKind::Overlay, EQUITY_SERIES, SeriesKind::Line, t(0), 100.0);
        store.sample("Other", ChartKind::Overlay, "X", SeriesKind::Line, t(0), 1.0);

        let without_equity = store.take_updates(|name| name != EQUITY_CHART);
        assert_eq!(without_equity.len(), 1);
        assert_eq!(without_equity[0].name, "Other");

        store.sample(EQUITY_CHART, ChartKind::Overlay, EQUITY_SERIES, SeriesKind::Line, t(1), 101.0);
        let with_equity = store.take_updates(|_| true);
        assert_eq!(with_equity.len(), 1);
        assert_eq!(with_equity[0].series[EQUITY_SERIES].points.len(), 2);
    }

    #[test]
    fn sample_range_merges_into_existing_charts() {
        let store = ChartStore::new();
        store.sample("Custom", ChartKind::Overlay, "A", SeriesKind::Line, t(0), 1.0);
        store.take_updates(|_| true);

        let mut fragment = Chart::new("Custom", ChartKind::Overlay);
        fragment.series_mut("A", SeriesKind::Line).push(t(1), 2.0);
        fragment.series_mut("B", SeriesKind::Bar).push(t(1), 5.0);
        let mut other = Chart::new("Fresh", ChartKind::Stacked);
        other.series_mut("Z", SeriesKind::Line).push(t(1), 9.0);

        store.sample_range(vec![fragment, other]);

        assert_eq!(store.len(), 2);
        let delta = store.take_updates(|_| true);
        assert_eq!(delta_points(&delta), 3);
        let custom = store.snapshot().into_iter().find(|c| c.name == "Custom").unwrap();
        assert_eq!(custom.series["A"].points.len(), 2);
    }

    #[test]
    fn concurrent_appends_are_neither_lost_nor_double_counted() {
        let store = Arc::new(ChartStore::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        store.sample(
                            "Load",
                            ChartKind::Overlay,
                            &format!("s{p}"),
                            SeriesKind::Line,
                            t(i),
                            i as f64,
                        );
                    }
                })
            })
            .collect();

        let mut seen = 0;
        while producers.iter().any(|h| !h.is_finished()) {
            seen += delta_points(&store.take_updates(|_| true));
        }
        for h in producers {
            h.join().unwrap();
        }
        seen += delta_points(&store.take_updates(|_| true));
        assert_eq!(seen, 2000);
    }
}
