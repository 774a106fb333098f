use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use market_relay::api::{create_router, ApiState, Broadcaster};
use market_relay::config::AppConfig;
use market_relay::observability::{metrics, tracing as relay_tracing, RateLimitedLogger};
use market_relay::price_infra::build_pipeline;
use market_relay::utils::helper::{fixed_interval, shutdown_signal};
use market_relay::utils::task_supervisor::TaskSupervisor;

const SUPERVISOR_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Step 1: Configuration and logging
    let env = std::env::var(market_relay::ENV_VAR)
        .unwrap_or_else(|_| market_relay::DEFAULT_ENV.to_string());
    let config = AppConfig::load(&env).context("loading configuration")?;

    relay_tracing::init(&config.logging);
    config.validate().context("validating configuration")?;
    config.log_config();
    metrics::register_metrics();

    let logger = Arc::new(RateLimitedLogger::new(config.timing.log_dedup_window()));
    let broadcaster = Arc::new(Broadcaster::new(config.broadcast.subscriber_buffer));
    let mut supervisor = TaskSupervisor::new();

    // Step 2: Sources. A construction failure keeps the listeners up with
    // empty responses but starts no fetch loops.
    let aggregator = match build_pipeline(&config, logger) {
        Ok(pipeline) => {
            for cache in &pipeline.caches {
                let name = format!("cache_poll:{}", cache.source_name());
                supervisor.spawn(name, cache.clone().run());
            }
            supervisor.spawn(
                "broadcast_tick",
                broadcaster.clone().run_ticks(pipeline.aggregator.clone(), config.timing.tick_interval()),
            );
            Some(pipeline.aggregator)
        }
        Err(e) => {
            tracing::error!("Ticker sources failed to initialize, serving empty markets: {}", e);
            None
        }
    };

    supervisor.spawn(
        "heartbeat",
        broadcaster.clone().run_heartbeat(config.timing.heartbeat_interval()),
    );

    // Step 3: HTTP + WebSocket
    let state = Arc::new(ApiState {
        aggregator,
        broadcaster,
    });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.server.listen_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    // Step 4: Supervise until the server drains
    let mut health_timer = fixed_interval(SUPERVISOR_CHECK_INTERVAL);
    let served = loop {
        tokio::select! {
            outcome = &mut server => break outcome,
            _ = health_timer.tick() => {
                if let Err(e) = supervisor.check_health() {
                    tracing::error!("Background task failure: {}", e);
                }
            }
        }
    };

    supervisor.shutdown_all();
    served.context("server task panicked")?.context("serving HTTP")?;

    tracing::info!("Shutdown complete");
    Ok(())
}
