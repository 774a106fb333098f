pub mod binance;
pub mod coinbase;
pub mod kraken;

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use crate::error::{Error, Result};
use crate::price_infra::SourceConfig;
use crate::types::Ticker;

pub use binance::BinanceConnector;
pub use coinbase::CoinbaseConnector;
pub use kraken::KrakenConnector;

/// Hard ceiling for a single upstream request. Calls abandoned by a timeout
/// guard still end here at the latest.
const REQUEST_CEILING: Duration = Duration::from_secs(15);

/// One upstream quote provider.
///
/// Implementations must not mutate shared state: a call abandoned by a
/// deadline keeps running in the background.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TickerSource: Send + Sync {
    /// Source name attributed to tickers and error records.
    fn name(&self) -> &str;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker>;
}

pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("market-relay/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_CEILING)
        .build()
        .map_err(|e| Error::SourceInit(format!("HTTP client: {}", e)))
}

pub fn build_source(config: &SourceConfig, client: reqwest::Client) -> Result<Arc<dyn TickerSource>> {
    let name = config.name.clone();
    let base_url = config.base_url.clone();

    let source: Arc<dyn TickerSource> = match config.connector_name() {
        "binance" => Arc::new(BinanceConnector::new(name, base_url, client)),
        "coinbase" => Arc::new(CoinbaseConnector::new(name, base_url, client)),
        "kraken" => Arc::new(KrakenConnector::new(name, base_url, client)),
        other => {
            return Err(Error::SourceInit(format!(
                "source '{}' uses unknown connector '{}'",
                config.name, other
            )));
        }
    };

    tracing::debug!("Built {} connector for source {}", config.connector_name(), config.name);
    Ok(source)
}

/// Send a GET and decode the JSON body, mapping every failure to a provider error.
pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
    exchange: &str,
    request: reqwest::RequestBuilder,
) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::provider(exchange, format!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::provider(exchange, format!("HTTP {}", status)));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| Error::provider(exchange, format!("malformed response: {}", e)))
}

/// Exchanges quote prices as decimal strings; missing or unparseable is invalid.
pub(crate) fn parse_price(
    exchange: &str,
    symbol: &str,
    side: &str,
    raw: Option<&str>,
) -> Result<f64> {
    let invalid = |reason: String| Error::InvalidTicker {
        exchange: exchange.to_string(),
        symbol: symbol.to_string(),
        reason,
    };

    let raw = raw.ok_or_else(|| invalid(format!("missing {}", side)))?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| invalid(format!("unparseable {} '{}'", side, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_infra::FetchStrategy;

    #[test]
    fn test_build_source_uses_connector_override() {
        let mut config = SourceConfig::new("mirror", 500, FetchStrategy::Live);
        config.connector = Some("coinbase".to_string());

        let source = build_source(&config, reqwest::Client::new()).unwrap();
        assert_eq!(source.name(), "mirror");
    }

    #[test]
    fn test_unknown_connector_fails_construction() {
        let config = SourceConfig::new("bitstamp", 500, FetchStrategy::Live);

        match build_source(&config, reqwest::Client::new()) {
            Err(Error::SourceInit(msg)) => assert!(msg.contains("bitstamp")),
            Err(other) => panic!("expected SourceInit, got {:?}", other),
            Ok(_) => panic!("expected SourceInit, got a source"),
        }
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("a", "BTC-USDT", "bid", Some(" 100.5 ")).unwrap(), 100.5);
        assert!(matches!(
            parse_price("a", "BTC-USDT", "bid", None),
            Err(Error::InvalidTicker { .. })
        ));
        assert!(matches!(
            parse_price("a", "BTC-USDT", "ask", Some("n/a")),
            Err(Error::InvalidTicker { .. })
        ));
    }
}
