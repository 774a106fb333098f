use async_trait::async_trait;
use serde::Deserialize;
use crate::price_infra::connectors::{get_json, parse_price, TickerSource};
use crate::error::{Error, Result};
use crate::types::{Symbol, Ticker};
use crate::utils::helper::current_timestamp_ms;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";

pub struct BinanceConnector {
    source_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl BinanceConnector {
    pub fn new(source_id: String, base_url: Option<String>, client: reqwest::Client) -> Self {
        BinanceConnector {
            source_id,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        }
    }
}

#[async_trait]
impl TickerSource for BinanceConnector {
    fn name(&self) -> &str {
        &self.source_id
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let symbol = Symbol::parse(symbol).map_err(|e| Error::provider(&self.source_id, e))?;
        let canonical = symbol.to_string();

        let request = self.client
            .get(format!("{}/api/v3/ticker/bookTicker", self.base_url.trim_end_matches('/')))
            .query(&[("symbol", symbol.concatenated())]);
        let data: BinanceBookTicker = get_json(&self.source_id, request).await?;

        Ticker::new(
            self.source_id.clone(),
            canonical.clone(),
            parse_price(&self.source_id, &canonical, "bid", data.bid_price.as_deref())?,
            parse_price(&self.source_id, &canonical, "ask", data.ask_price.as_deref())?,
            current_timestamp_ms(),
        )
        .validate()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceBookTicker {
    bid_price: Option<String>,
    ask_price: Option<String>,
}
