use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::observability::metrics::{AGGREGATION_CYCLES, AGGREGATION_DURATION, OVERALL_TIMEOUTS, SOURCE_ERRORS};
use crate::observability::tracing::trace_aggregation;
use crate::observability::RateLimitedLogger;
use crate::price_infra::cache::SlowSourceCache;
use crate::price_infra::connectors::TickerSource;
use crate::types::{Symbol, Ticker};
use crate::utils::with_timeout;

pub const SYSTEM_SOURCE: &str = "system";
pub const OVERALL_TIMEOUT_MESSAGE: &str = "overall timeout";

/// One partial failure inside an aggregation result.
///
/// Serialized as `{"exchange": .., "error": ..}` on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceError {
    #[serde(rename = "exchange")]
    pub source: String,
    #[serde(rename = "error")]
    pub message: String,
}

impl SourceError {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError {
            source: source.into(),
            message: message.into(),
        }
    }

    /// Attribute `error` to `source`, stripping the source prefix from provider messages.
    pub fn from_error(source: &str, error: &Error) -> Self {
        let message = match error {
            Error::Provider { message, .. } => message.clone(),
            Error::InvalidTicker { symbol, reason, .. } => format!("invalid ticker for {}: {}", symbol, reason),
            other => other.to_string(),
        };
        SourceError::new(error.exchange().unwrap_or(source), message)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub markets: Vec<Ticker>,
    pub errors: Vec<SourceError>,
}

/// A source fetched on every aggregation cycle.
pub struct LiveSource {
    pub source: Arc<dyn TickerSource>,
    pub per_call_timeout: Duration,
}

/// Market Aggregator - merges every source into one best-effort market list
///
/// ## Cycle
/// 1. Each cached source contributes its cache entry when fresh, or one
///    "temporarily unavailable" record when stale or empty. The cycle never
///    waits on a cache.
/// 2. Every (live source, symbol) pair is fetched concurrently under that
///    source's per-call timeout.
/// 3. The fan-out as a whole is bounded by `overall_deadline`. Pairs still
///    pending at the deadline are abandoned and reported by a single
///    `{"system", "overall timeout"}` record.
/// 4. Settled pairs are merged in completion order. Invalid tickers (non-positive
///    bid or ask) are dropped and reported like any other failure.
///
/// ## Guarantees
/// - Returns within `overall_deadline` plus scheduling overhead.
/// - Always returns a result; with every source down, `markets` is empty and
///   `errors` explains why.
/// - A failing source never removes another source's tickers.
pub struct MarketAggregator {
    live: Vec<LiveSource>,
    caches: Vec<Arc<SlowSourceCache>>,
    symbols: Vec<Symbol>,
    cache_ttl: Duration,
    overall_deadline: Duration,
    logger: Arc<RateLimitedLogger>,
    cycles: AtomicU64,
}

impl MarketAggregator {
    pub fn new(
        live: Vec<LiveSource>,
        caches: Vec<Arc<SlowSourceCache>>,
        symbols: Vec<Symbol>,
        cache_ttl: Duration,
        overall_deadline: Duration,
        logger: Arc<RateLimitedLogger>,
    ) -> Self {
        MarketAggregator {
            live,
            caches,
            symbols,
            cache_ttl,
            overall_deadline,
            logger,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Sources fetched on every cycle, in configuration order.
    pub fn live_source_names(&self) -> Vec<&str> {
        self.live.iter().map(|live| live.source.name()).collect()
    }

    pub async fn fetch_all_markets(&self) -> AggregationResult {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        self.aggregate().instrument(trace_aggregation(cycle)).await
    }

    async fn aggregate(&self) -> AggregationResult {
        let started = Instant::now();
        let deadline = started + self.overall_deadline;
        let mut result = AggregationResult::default();

        // Step 1: Cached sources
        for cache in &self.caches {
            let read = cache.read(self.cache_ttl);
            if read.fresh {
                result.markets.extend(read.tickers().iter().filter(|t| t.is_valid()).cloned());
            } else {
                let stale = Error::StaleCache { exchange: cache.source_name().to_string() };
                result.errors.push(SourceError::from_error(cache.source_name(), &stale));
            }
        }

        // Step 2: Fan out live (source, symbol) pairs
        let mut pending: FuturesUnordered<_> = self.live.iter()
            .flat_map(|live| self.symbols.iter().map(move |symbol| fetch_pair(live, symbol)))
            .collect();

        // Step 3: Merge in completion order until everything settles or the deadline hits
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((_, Ok(ticker)))) => result.markets.push(ticker),
                Ok(Some((source, Err(e)))) => result.errors.push(SourceError::from_error(&source, &e)),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "Aggregation deadline of {:?} hit with {} fetches pending",
                        self.overall_deadline,
                        pending.len()
                    );
                    OVERALL_TIMEOUTS.inc();
                    result.errors.push(SourceError::new(SYSTEM_SOURCE, OVERALL_TIMEOUT_MESSAGE));
                    break;
                }
            }
        }

        // Step 4: Report
        for error in &result.errors {
            self.logger.warn(&format!("{}: {}", error.source, error.message));
        }

        AGGREGATION_CYCLES.inc();
        SOURCE_ERRORS.inc_by(result.errors.len() as u64);
        AGGREGATION_DURATION.observe(started.elapsed().as_secs_f64());

        tracing::debug!(
            "Aggregated {} tickers with {} errors in {:?}",
            result.markets.len(),
            result.errors.len(),
            started.elapsed()
        );

        result
    }
}

/// Fetch one pair under the source's per-call timeout. Yields the source name
/// alongside the outcome so failures can be attributed.
async fn fetch_pair(live: &LiveSource, symbol: &Symbol) -> (String, Result<Ticker>) {
    let source = Arc::clone(&live.source);
    let name = source.name().to_string();
    let symbol = symbol.to_string();

    let outcome = with_timeout(
        async move { source.fetch_ticker(&symbol).await.and_then(Ticker::validate) },
        live.per_call_timeout,
    )
    .await;

    (name, outcome)
}
