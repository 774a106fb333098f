use std::collections::HashMap;
use async_trait::async_trait;
use serde::Deserialize;
use crate::price_infra::connectors::{get_json, parse_price, TickerSource};
use crate::error::{Error, Result};
use crate::types::{Symbol, Ticker};
use crate::utils::helper::current_timestamp_ms;

const DEFAULT_BASE_URL: &str = "https://api.kraken.com";

pub struct KrakenConnector {
    source_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl KrakenConnector {
    pub fn new(source_id: String, base_url: Option<String>, client: reqwest::Client) -> Self {
        KrakenConnector {
            source_id,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        }
    }

    /// Kraken spells bitcoin XBT.
    fn pair(symbol: &Symbol) -> String {
        let asset = |code: &str| if code == "BTC" { "XBT".to_string() } else { code.to_string() };
        format!("{}{}", asset(symbol.base()), asset(symbol.quote()))
    }
}

#[async_trait]
impl TickerSource for KrakenConnector {
    fn name(&self) -> &str {
        &self.source_id
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let symbol = Symbol::parse(symbol).map_err(|e| Error::provider(&self.source_id, e))?;
        let canonical = symbol.to_string();

        let request = self.client
            .get(format!("{}/0/public/Ticker", self.base_url.trim_end_matches('/')))
            .query(&[("pair", Self::pair(&symbol))]);
        let response: KrakenResponse = get_json(&self.source_id, request).await?;

        if !response.error.is_empty() {
            return Err(Error::provider(&self.source_id, response.error.join("; ")));
        }

        // The result is keyed by Kraken's internal pair name, which can differ
        // from the requested one (XBTUSD -> XXBTZUSD).
        let data = response.result
            .and_then(|result| result.into_values().next())
            .ok_or_else(|| Error::provider(&self.source_id, format!("no ticker returned for {}", canonical)))?;

        Ticker::new(
            self.source_id.clone(),
            canonical.clone(),
            parse_price(&self.source_id, &canonical, "bid", data.b.first().map(String::as_str))?,
            parse_price(&self.source_id, &canonical, "ask", data.a.first().map(String::as_str))?,
            current_timestamp_ms(),
        )
        .validate()
    }
}

#[derive(Deserialize)]
struct KrakenResponse {
    #[serde(default)]
    error: Vec<String>,
    result: Option<HashMap<String, KrakenTickerData>>,
}

/// `a` and `b` are `[price, whole lot volume, lot volume]`.
#[derive(Deserialize)]
struct KrakenTickerData {
    #[serde(default)]
    a: Vec<String>,
    #[serde(default)]
    b: Vec<String>,
}
