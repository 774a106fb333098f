use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

/// One exchange/symbol bid-ask quote.
///
/// `ts` is milliseconds since epoch. A ticker only enters a result set after
/// [`Ticker::validate`] accepted it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub exchange: String,
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub ts: u64,
}

impl Ticker {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>, bid: f64, ask: f64, ts: u64) -> Self {
        Ticker {
            exchange: exchange.into(),
            symbol: symbol.into(),
            bid,
            ask,
            ts,
        }
    }

    pub fn is_valid(&self) -> bool {
        is_positive_price(self.bid) && is_positive_price(self.ask)
    }

    pub fn validate(self) -> Result<Ticker> {
        if !is_positive_price(self.bid) {
            return Err(self.invalid(format!("bid {} is not a positive price", self.bid)));
        }
        if !is_positive_price(self.ask) {
            return Err(self.invalid(format!("ask {} is not a positive price", self.ask)));
        }
        Ok(self)
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidTicker {
            exchange: self.exchange.clone(),
            symbol: self.symbol.clone(),
            reason,
        }
    }
}

fn is_positive_price(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wire_format() {
        let ticker = Ticker::new("binance", "BTC-USDT", 43000.0, 43010.5, 1705640000000);
        let json = serde_json::to_value(&ticker).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "exchange": "binance",
                "symbol": "BTC-USDT",
                "bid": 43000.0,
                "ask": 43010.5,
                "ts": 1705640000000u64,
            })
        );
    }

    #[test]
    fn test_validate_rejects_non_positive_and_non_finite() {
        let base = Ticker::new("kraken", "ETH-USDT", 2500.0, 2501.0, 1);
        assert!(base.clone().validate().is_ok());

        for (bid, ask) in [(0.0, 1.0), (1.0, 0.0), (-3.0, 1.0), (f64::NAN, 1.0), (1.0, f64::INFINITY)] {
            let ticker = Ticker { bid, ask, ..base.clone() };
            assert!(!ticker.is_valid());
            match ticker.validate() {
                Err(Error::InvalidTicker { exchange, symbol, .. }) => {
                    assert_eq!(exchange, "kraken");
                    assert_eq!(symbol, "ETH-USDT");
                }
                other => panic!("expected InvalidTicker, got {:?}", other),
            }
        }
    }

    proptest! {
        #[test]
        fn prop_wire_round_trip(
            exchange in "[a-z]{1,12}",
            base in "[A-Z]{2,5}",
            quote in "[A-Z]{3,4}",
            bid in 1e-8f64..1e9,
            spread in 0.0f64..1e3,
            ts in 0u64..4_000_000_000_000,
        ) {
            let ticker = Ticker::new(exchange, format!("{}-{}", base, quote), bid, bid + spread, ts);
            let json = serde_json::to_string(&ticker).unwrap();
            let parsed: Ticker = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(parsed, ticker);
        }

        #[test]
        fn prop_validate_agrees_with_is_valid(bid in proptest::num::f64::ANY, ask in proptest::num::f64::ANY) {
            let ticker = Ticker::new("a", "BTC-USDT", bid, ask, 0);
            prop_assert_eq!(ticker.is_valid(), ticker.clone().validate().is_ok());
        }
    }
}
