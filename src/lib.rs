pub mod api;
pub mod config;
pub mod error;
pub mod observability;
pub mod price_infra;
pub mod types;
pub mod utils;

/// Environment variable selecting the `config/{env}` layer.
pub const ENV_VAR: &str = "MARKET_RELAY_ENV";

pub const DEFAULT_ENV: &str = "development";
