use std::fmt;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

/// Canonical "BASE-QUOTE" market symbol, always upper-case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    /// Accepts `BTC-USDT`, `btc/usdt` and `BTC_USDT`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.trim().split(['-', '/', '_']);

        let (Some(base), Some(quote), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::ConfigError(format!("symbol '{}' is not in BASE-QUOTE form", raw)));
        };

        let valid = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid(base) || !valid(quote) {
            return Err(Error::ConfigError(format!("symbol '{}' is not in BASE-QUOTE form", raw)));
        }

        Ok(Symbol {
            base: base.to_ascii_uppercase(),
            quote: quote.to_ascii_uppercase(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Exchange pair without separator, e.g. `BTCUSDT`.
    pub fn concatenated(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl TryFrom<String> for Symbol {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Symbol::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.to_string()
    }
}
