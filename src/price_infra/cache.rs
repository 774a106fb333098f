use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use futures_util::future::join_all;
use tokio::time::Instant;
use tracing::Instrument;

use crate::error::Error;
use crate::observability::metrics::{CACHE_POLLS, CACHE_POLL_FAILURES};
use crate::observability::tracing::trace_cache_poll;
use crate::observability::RateLimitedLogger;
use crate::price_infra::connectors::TickerSource;
use crate::types::{Symbol, Ticker};
use crate::utils::helper::{current_timestamp_ms, fixed_interval};
use crate::utils::with_timeout;

/// Result of one successful poll. Never mutated after construction.
#[derive(Debug)]
pub struct CacheEntry {
    pub data: Vec<Ticker>,
    /// Epoch millis at which the poll completed.
    pub captured_at: u64,
    captured_instant: Instant,
}

#[derive(Debug, Clone)]
pub struct CacheRead {
    pub data: Arc<CacheEntry>,
    pub fresh: bool,
}

impl CacheRead {
    pub fn tickers(&self) -> &[Ticker] {
        &self.data.data
    }
}

/// Background-refreshed cache for one high-latency source.
///
/// Only the poll loop writes, and it replaces the whole entry at once, so a
/// reader holds either the previous poll's data or the new one, never a mix.
pub struct SlowSourceCache {
    source: Arc<dyn TickerSource>,
    symbols: Vec<Symbol>,
    per_call_timeout: Duration,
    poll_interval: Duration,
    entry: RwLock<Option<Arc<CacheEntry>>>,
    logger: Arc<RateLimitedLogger>,
}

impl SlowSourceCache {
    pub fn new(
        source: Arc<dyn TickerSource>,
        symbols: Vec<Symbol>,
        per_call_timeout: Duration,
        poll_interval: Duration,
        logger: Arc<RateLimitedLogger>,
    ) -> Self {
        SlowSourceCache {
            source,
            symbols,
            per_call_timeout,
            poll_interval,
            entry: RwLock::new(None),
            logger,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Poll forever at the configured interval. The first poll runs immediately.
    pub async fn run(self: Arc<Self>) {
        let mut timer = fixed_interval(self.poll_interval);
        tracing::info!(
            "Starting cache poll for {} every {:?}",
            self.source_name(),
            self.poll_interval
        );

        loop {
            timer.tick().await;
            self.poll_once().await;
        }
    }

    /// Fetch every tracked symbol and swap in the new entry. Returns whether
    /// the entry was replaced; a poll yielding no valid ticker keeps the old one.
    pub async fn poll_once(&self) -> bool {
        let span = trace_cache_poll(self.source_name());
        self.poll_inner().instrument(span).await
    }

    async fn poll_inner(&self) -> bool {
        CACHE_POLLS.inc();

        let fetches = self.symbols.iter().map(|symbol| {
            let source = Arc::clone(&self.source);
            let symbol = symbol.to_string();
            with_timeout(
                async move { source.fetch_ticker(&symbol).await.and_then(Ticker::validate) },
                self.per_call_timeout,
            )
        });

        let mut data = Vec::with_capacity(self.symbols.len());
        for (symbol, outcome) in self.symbols.iter().zip(join_all(fetches).await) {
            match outcome {
                Ok(ticker) => data.push(ticker),
                Err(e) => {
                    self.logger.warn(&poll_failure_line(self.source_name(), symbol, &e));
                }
            }
        }

        if data.is_empty() {
            CACHE_POLL_FAILURES.inc();
            self.logger.error(&format!(
                "cache poll {} produced no tickers; keeping previous entry",
                self.source_name()
            ));
            return false;
        }

        let entry = Arc::new(CacheEntry {
            data,
            captured_at: current_timestamp_ms(),
            captured_instant: Instant::now(),
        });
        tracing::debug!("Cache {} refreshed with {} tickers", self.source_name(), entry.data.len());

        *self.entry.write().unwrap_or_else(PoisonError::into_inner) = Some(entry);
        true
    }

    /// Current entry and whether it is younger than `ttl`. A cache that has
    /// never completed a poll reads as empty and stale.
    pub fn read(&self, ttl: Duration) -> CacheRead {
        let entry = self.entry.read().unwrap_or_else(PoisonError::into_inner).clone();

        match entry {
            Some(entry) => CacheRead {
                fresh: entry.captured_instant.elapsed() < ttl,
                data: entry,
            },
            None => CacheRead {
                data: Arc::new(CacheEntry {
                    data: Vec::new(),
                    captured_at: 0,
                    captured_instant: Instant::now(),
                }),
                fresh: false,
            },
        }
    }
}

/// Keyed per symbol so the rate limiter keeps distinct failures apart.
fn poll_failure_line(source: &str, symbol: &Symbol, error: &Error) -> String {
    format!("cache poll {} {}: {}", source, symbol, error)
}
