use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    algorithm::SecurityType,
    config::Settings,
    notifier::Notifier,
    orders::{Order, OrderEvent},
    packet::{AlgorithmStatus, JobIds, LiveResultPacket},
    store::SqliteStore,
    utils::now_ts,
};

const MAX_MESSAGES: usize = 500;
const MAX_ORDERS: usize = 1_000;

#[derive(Debug, Clone, Serialize)]
pub struct FeedMessage {
    pub ts: f64,
    pub level: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub ts: f64,
    pub algorithm_id: String,
    pub status: AlgorithmStatus,
    pub message: String,
}

#[derive(Default)]
struct FeedState {
    latest: Option<LiveResultPacket>,
    packets: u64,
    messages: VecDeque<FeedMessage>,
    orders: VecDeque<Order>,
    order_events: VecDeque<OrderEvent>,
    status: Option<StatusView>,
    security_types: Vec<SecurityType>,
}

fn push_bounded<T>(q: &mut VecDeque<T>, item: T, max: usize) {
    if q.len() >= max {
        q.pop_front();
    }
    q.push_back(item);
}

/// In-process viewer: every notification is logged and the recent ones are kept in memory
/// for the local HTTP dashboard.
#[derive(Default)]
pub struct DashboardFeed {
    state: RwLock<FeedState>,
}

impl DashboardFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_message(&self, level: &'static str, text: &str, trace: Option<&str>) {
        let msg = FeedMessage {
            ts: now_ts(),
            level,
            text: text.to_string(),
            trace: trace.map(str::to_string),
        };
        push_bounded(&mut self.state.write().messages, msg, MAX_MESSAGES);
    }

    pub fn latest(&self) -> Option<LiveResultPacket> {
        self.state.read().latest.clone()
    }

    /// Newest first.
    pub fn recent_messages(&self, limit: usize) -> Vec<FeedMessage> {
        self.state.read().messages.iter().rev().take(limit).cloned().collect()
    }

    /// Orders seen across realtime packets, newest first.
    pub fn recent_orders(&self, limit: usize) -> Vec<Order> {
        self.state.read().orders.iter().rev().take(limit).cloned().collect()
    }

    pub fn health_json(&self) -> JsonValue {
        let st = self.state.read();
        serde_json::json!({
            "ts": now_ts(),
            "status": st.status,
            "packets": st.packets,
            "last_packet_ts": st.latest.as_ref().map(|p| p.time),
            "security_types": st.security_types,
            "order_events": st.order_events.len(),
        })
    }
}

impl Notifier for DashboardFeed {
    fn debug_message(&self, job: &JobIds, message: &str) -> Result<()> {
        log::debug!("feed.debug deploy_id={} msg={}", job.deploy_id, message);
        self.push_message("debug", message, None);
        Ok(())
    }

    fn log_message(&self, job: &JobIds, message: &str) -> Result<()> {
        log::info!("feed.log deploy_id={} msg={}", job.deploy_id, message);
        self.push_message("log", message, None);
        Ok(())
    }

    fn runtime_error(&self, job: &JobIds, message: &str, stack_trace: &str) -> Result<()> {
        log::error!("feed.error deploy_id={} msg={}", job.deploy_id, message);
        self.push_message("error", message, Some(stack_trace));
        Ok(())
    }

    fn security_types(&self, job: &JobIds, types: &[SecurityType]) -> Result<()> {
        log::info!("feed.security_types deploy_id={} types={:?}", job.deploy_id, types);
        self.state.write().security_types = types.to_vec();
        Ok(())
    }

    fn algorithm_status(
        &self,
        job: &JobIds,
        algorithm_id: &str,
        status: AlgorithmStatus,
        message: &str,
    ) -> Result<()> {
        log::info!(
            "feed.status deploy_id={} algorithm_id={} status={}",
            job.deploy_id,
            algorithm_id,
            status.as_str()
        );
        self.state.write().status = Some(StatusView {
            ts: now_ts(),
            algorithm_id: algorithm_id.to_string(),
            status,
            message: message.to_string(),
        });
        Ok(())
    }

    fn live_result(&self, packet: &LiveResultPacket) -> Result<()> {
        log::debug!(
            "feed.result deploy_id={} charts={} orders={}",
            packet.job.deploy_id,
            packet.results.charts.len(),
            packet.results.orders.len()
        );
        let mut st = self.state.write();
        for o in &packet.results.orders {
            push_bounded(&mut st.orders, o.clone(), MAX_ORDERS);
        }
        st.packets += 1;
        st.latest = Some(packet.clone());
        Ok(())
    }

    fn order_event(&self, job: &JobIds, event: &OrderEvent) -> Result<()> {
        log::info!(
            "feed.order_event deploy_id={} order_id={} status={}",
            job.deploy_id,
            event.order_id,
            event.status.as_str()
        );
        push_bounded(&mut self.state.write().order_events, event.clone(), MAX_ORDERS);
        Ok(())
    }
}

#[derive(Clone)]
pub struct DashboardState {
    pub feed: Arc<DashboardFeed>,
    pub store: SqliteStore,
}

pub async fn serve_dashboard(settings: Settings, feed: Arc<DashboardFeed>, store: SqliteStore) -> Result<()> {
    let state = DashboardState { feed, store };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/health", get(api_health))
        .route("/api/result", get(api_result))
        .route("/api/messages", get(api_messages))
        .route("/api/orders", get(api_orders))
        .route("/api/objects", get(api_objects))
        .route("/api/object", get(api_object))
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", settings.dashboard_host, settings.dashboard_port)
        .parse()
        .context("dashboard addr parse")?;

    log::info!("dashboard.start url=http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn api_health(State(st): State<DashboardState>) -> impl IntoResponse {
    Json(st.feed.health_json())
}

async fn api_result(State(st): State<DashboardState>) -> impl IntoResponse {
    match st.feed.latest() {
        Some(p) => Json(p).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[derive(Deserialize)]
struct LimitQ {
    limit: Option<usize>,
}

async fn api_messages(State(st): State<DashboardState>, Query(q): Query<LimitQ>) -> impl IntoResponse {
    Json(st.feed.recent_messages(q.limit.unwrap_or(100)))
}

async fn api_orders(State(st): State<DashboardState>, Query(q): Query<LimitQ>) -> impl IntoResponse {
    Json(st.feed.recent_orders(q.limit.unwrap_or(50)))
}

async fn api_objects(State(st): State<DashboardState>, Query(q): Query<LimitQ>) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(50);
    match st.store.list_objects(limit) {
        Ok(rows) => Json(JsonValue::Array(rows)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
struct KeyQ {
    key: String,
}

async fn api_object(State(st): State<DashboardState>, Query(q): Query<KeyQ>) -> impl IntoResponse {
    let content_type = if q.key.ends_with(".json") {
        "application/json"
    } else {
        "text/plain; charset=utf-8"
    };
    match st.store.fetch_object(&q.key) {
        Ok(Some(body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "not found").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
