use std::collections::HashSet;
use crate::config::*;
use crate::error::{Error, Result};
use crate::price_infra::{FetchStrategy, SourceConfig};
use crate::types::Symbol;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "MARKET_RELAY";

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub symbols: Vec<String>,
    pub sources: Vec<SourceConfig>,
    pub timing: TimingConfig,
    pub broadcast: BroadcastConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig::default(),
            symbols: vec![
                "BTC-USDT".to_string(),
                "ETH-USDT".to_string(),
                "SOL-USDT".to_string(),
            ],
            sources: vec![
                SourceConfig::new("binance", 1_500, FetchStrategy::Live),
                SourceConfig::new("coinbase", 1_500, FetchStrategy::Live),
                SourceConfig::new("kraken", 5_000, FetchStrategy::Cached),
            ],
            timing: TimingConfig::default(),
            broadcast: BroadcastConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Layered load: built-in defaults, `config/default`, `config/{env}`, then
    /// `MARKET_RELAY__*` environment variables.
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("symbols")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Tracked symbols in canonical form.
    pub fn symbols(&self) -> Result<Vec<Symbol>> {
        self.symbols.iter().map(|raw| Symbol::parse(raw)).collect()
    }

    pub fn validate(&self) -> Result<()> {
        let symbols = self.symbols()?;
        if symbols.is_empty() {
            return Err(Error::ConfigError("at least one symbol must be tracked".to_string()));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(Error::ConfigError("source name must not be empty".to_string()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(Error::ConfigError(format!("duplicate source name '{}'", source.name)));
            }
            if source.per_call_timeout_ms == 0 {
                return Err(Error::ConfigError(format!(
                    "source '{}' needs a non-zero per_call_timeout_ms",
                    source.name
                )));
            }
        }

        let timing = &self.timing;
        for (field, value) in [
            ("poll_interval_ms", timing.poll_interval_ms),
            ("tick_interval_ms", timing.tick_interval_ms),
            ("cache_ttl_ms", timing.cache_ttl_ms),
            ("heartbeat_interval_ms", timing.heartbeat_interval_ms),
            ("overall_deadline_ms", timing.overall_deadline_ms),
        ] {
            if value == 0 {
                return Err(Error::ConfigError(format!("timing.{} must be non-zero", field)));
            }
        }

        // Freshness would flap every cycle otherwise.
        if timing.cache_ttl_ms < timing.poll_interval_ms {
            return Err(Error::ConfigError(format!(
                "timing.cache_ttl_ms ({}) must be >= timing.poll_interval_ms ({})",
                timing.cache_ttl_ms, timing.poll_interval_ms
            )));
        }

        if self.broadcast.subscriber_buffer == 0 {
            return Err(Error::ConfigError("broadcast.subscriber_buffer must be non-zero".to_string()));
        }

        let slowest_live = self.sources.iter()
            .filter(|s| s.enabled && s.strategy == FetchStrategy::Live)
            .map(|s| s.per_call_timeout_ms)
            .max()
            .unwrap_or(0);
        if timing.overall_deadline_ms < slowest_live {
            tracing::warn!(
                "overall_deadline_ms ({}) is shorter than the slowest live per-call timeout ({}); slow calls will surface as an overall timeout",
                timing.overall_deadline_ms, slowest_live
            );
        }
        if timing.overall_deadline_ms > timing.tick_interval_ms {
            tracing::warn!(
                "overall_deadline_ms ({}) exceeds tick_interval_ms ({}); ticks will be skipped while aggregation runs",
                timing.overall_deadline_ms, timing.tick_interval_ms
            );
        }

        Ok(())
    }

    pub fn log_config(&self) {
        tracing::info!("Relay configuration:");
        tracing::info!("  Listen address: {}", self.server.listen_addr);
        tracing::info!("  Symbols: {}", self.symbols.join(", "));
        for source in &self.sources {
            tracing::info!(
                "  Source {}: connector={} strategy={:?} timeout={}ms enabled={}",
                source.name,
                source.connector_name(),
                source.strategy,
                source.per_call_timeout_ms,
                source.enabled
            );
        }
        tracing::info!(
            "  Timing: poll={}ms tick={}ms ttl={}ms heartbeat={}ms deadline={}ms dedup={}ms",
            self.timing.poll_interval_ms,
            self.timing.tick_interval_ms,
            self.timing.cache_ttl_ms,
            self.timing.heartbeat_interval_ms,
            self.timing.overall_deadline_ms,
            self.timing.log_dedup_window_ms
        );
    }
}
