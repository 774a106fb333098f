pub mod aggregator;
pub mod cache;
pub mod connectors;

use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::Result;
use crate::observability::RateLimitedLogger;
use crate::price_infra::aggregator::{LiveSource, MarketAggregator};
use crate::price_infra::cache::SlowSourceCache;
use crate::price_infra::connectors::build_source;

pub use aggregator::{AggregationResult, SourceError};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SourceConfig {
    pub name: String,
    /// Adapter to use; defaults to `name`.
    #[serde(default)]
    pub connector: Option<String>,
    pub per_call_timeout_ms: u64,
    #[serde(default)]
    pub strategy: FetchStrategy,
    /// Overrides the adapter's public endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    pub fn new(name: &str, per_call_timeout_ms: u64, strategy: FetchStrategy) -> Self {
        SourceConfig {
            name: name.to_string(),
            connector: None,
            per_call_timeout_ms,
            strategy,
            base_url: None,
            enabled: true,
        }
    }

    pub fn connector_name(&self) -> &str {
        self.connector.as_deref().unwrap_or(&self.name)
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Fetched on every aggregation cycle.
    #[default]
    Live,
    /// Fetched only by a background [`SlowSourceCache`] poll.
    Cached,
}

/// Everything the relay runs on: the aggregator plus the caches whose poll
/// loops must be spawned alongside it.
pub struct Pipeline {
    pub aggregator: Arc<MarketAggregator>,
    pub caches: Vec<Arc<SlowSourceCache>>,
}

/// Construct every enabled source adapter and wire them into an aggregator.
///
/// Fails when any adapter cannot be built; the caller then runs without loops.
pub fn build_pipeline(config: &AppConfig, logger: Arc<RateLimitedLogger>) -> Result<Pipeline> {
    let client = connectors::http_client()?;
    let symbols = config.symbols()?;
    let timing = &config.timing;

    let mut live = Vec::new();
    let mut caches = Vec::new();

    for source_config in config.sources.iter().filter(|s| s.enabled) {
        let source = build_source(source_config, client.clone())?;

        match source_config.strategy {
            FetchStrategy::Live => live.push(LiveSource {
                source,
                per_call_timeout: source_config.per_call_timeout(),
            }),
            FetchStrategy::Cached => caches.push(Arc::new(SlowSourceCache::new(
                source,
                symbols.clone(),
                source_config.per_call_timeout(),
                timing.poll_interval(),
                logger.clone(),
            ))),
        }
    }

    tracing::info!(
        "Built pipeline: {} live sources, {} cached sources, {} symbols",
        live.len(),
        caches.len(),
        symbols.len()
    );

    let aggregator = MarketAggregator::new(
        live,
        caches.clone(),
        symbols,
        timing.cache_ttl(),
        timing.overall_deadline(),
        logger,
    );

    Ok(Pipeline {
        aggregator: Arc::new(aggregator),
        caches,
    })
}
