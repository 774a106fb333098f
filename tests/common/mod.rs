#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use market_relay::api::{create_router, ApiState, Broadcaster};
use market_relay::error::Result;
use market_relay::observability::RateLimitedLogger;
use market_relay::price_infra::aggregator::{LiveSource, MarketAggregator};
use market_relay::price_infra::connectors::TickerSource;
use market_relay::types::{Symbol, Ticker};
use tokio::net::TcpListener;

/// Quotes every symbol immediately at a fixed price.
pub struct FixedSource {
    pub name: String,
    pub bid: f64,
    pub ask: f64,
}

#[async_trait]
impl TickerSource for FixedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        Ok(Ticker::new(self.name.clone(), symbol, self.bid, self.ask, 1705640000000))
    }
}

/// Never answers.
pub struct HangingSource {
    pub name: String,
}

#[async_trait]
impl TickerSource for HangingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_ticker(&self, _symbol: &str) -> Result<Ticker> {
        std::future::pending().await
    }
}

pub fn live(source: impl TickerSource + 'static, timeout_ms: u64) -> LiveSource {
    LiveSource {
        source: Arc::new(source),
        per_call_timeout: Duration::from_millis(timeout_ms),
    }
}

pub fn aggregator(live: Vec<LiveSource>) -> Arc<MarketAggregator> {
    Arc::new(MarketAggregator::new(
        live,
        Vec::new(),
        vec![Symbol::parse("BTC-USDT").unwrap()],
        Duration::from_secs(30),
        Duration::from_secs(1),
        Arc::new(RateLimitedLogger::new(Duration::from_secs(60))),
    ))
}

pub fn state(aggregator: Option<Arc<MarketAggregator>>) -> Arc<ApiState> {
    Arc::new(ApiState {
        aggregator,
        broadcaster: Arc::new(Broadcaster::new(16)),
    })
}

/// Serve the router on an ephemeral local port.
pub async fn spawn_server(state: Arc<ApiState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });

    addr
}
