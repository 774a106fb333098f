use axum::{
    Router,
    routing::get,
    extract::{State, Json},
    http::header,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use crate::api::broadcaster::Broadcaster;
use crate::api::websocket::websocket_handler;
use crate::observability::metrics;
use crate::price_infra::aggregator::{AggregationResult, MarketAggregator, SourceError};
use crate::types::Ticker;

pub struct ApiState {
    /// `None` when the ticker sources failed to initialize.
    pub aggregator: Option<Arc<MarketAggregator>>,
    pub broadcaster: Arc<Broadcaster>,
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/markets", get(get_markets))
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarketsResponse {
    pub markets: Vec<Ticker>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<SourceError>,
}

impl From<AggregationResult> for MarketsResponse {
    fn from(result: AggregationResult) -> Self {
        MarketsResponse {
            markets: result.markets,
            errors: result.errors,
        }
    }
}

async fn get_markets(State(state): State<Arc<ApiState>>) -> Json<MarketsResponse> {
    let result = match &state.aggregator {
        Some(aggregator) => aggregator.fetch_all_markets().await,
        None => AggregationResult::default(),
    };

    Json(result.into())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sources_ready: bool,
    pub subscribers: usize,
    pub snapshot_size: usize,
}

async fn health_check(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let sources_ready = state.aggregator.is_some();

    Json(HealthResponse {
        status: if sources_ready { "ok" } else { "degraded" }.to_string(),
        sources_ready,
        subscribers: state.broadcaster.subscriber_count(),
        snapshot_size: state.broadcaster.snapshot().len(),
    })
}

async fn get_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}
