use tracing::Span;
use tracing_subscriber::EnvFilter;
use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` wins over the configured filter.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = installed {
        eprintln!("Tracing subscriber already installed: {}", e);
    }
}

pub fn trace_aggregation(cycle: u64) -> Span {
    tracing::info_span!(
        "aggregation",
        cycle,
    )
}

pub fn trace_cache_poll(source: &str) -> Span {
    tracing::info_span!(
        "cache_poll",
        source = %source,
    )
}
