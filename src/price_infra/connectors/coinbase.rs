use async_trait::async_trait;
use serde::Deserialize;
use crate::price_infra::connectors::{get_json, parse_price, TickerSource};
use crate::error::{Error, Result};
use crate::types::{Symbol, Ticker};
use crate::utils::helper::current_timestamp_ms;

const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";

pub struct CoinbaseConnector {
    source_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl CoinbaseConnector {
    pub fn new(source_id: String, base_url: Option<String>, client: reqwest::Client) -> Self {
        CoinbaseConnector {
            source_id,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        }
    }
}

#[async_trait]
impl TickerSource for CoinbaseConnector {
    fn name(&self) -> &str {
        &self.source_id
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        // Coinbase product ids already use BASE-QUOTE.
        let product_id = Symbol::parse(symbol)
            .map_err(|e| Error::provider(&self.source_id, e))?
            .to_string();

        let request = self.client.get(format!(
            "{}/products/{}/ticker",
            self.base_url.trim_end_matches('/'),
            product_id
        ));
        let data: CoinbaseTickerData = get_json(&self.source_id, request).await?;

        Ticker::new(
            self.source_id.clone(),
            product_id.clone(),
            parse_price(&self.source_id, &product_id, "bid", data.bid.as_deref())?,
            parse_price(&self.source_id, &product_id, "ask", data.ask.as_deref())?,
            current_timestamp_ms(),
        )
        .validate()
    }
}

#[derive(Deserialize)]
struct CoinbaseTickerData {
    bid: Option<String>,
    ask: Option<String>,
}
