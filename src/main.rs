use anyhow::Result;
use tracing::{debug, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

mod config;
mod error;
mod metrics;
mod prompt;
mod protocol;
mod ratelimit;
mod server;
mod upstream;

use metrics::Metrics;
use ratelimit::RateLimiter;
use server::AppState;
use upstream::CompletionClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chat_relay=info".parse()?)
        )
        .init();

    info!("Starting chat relay");

    let config = Arc::new(config::load_config()?);
    info!("Configuration loaded");
    info!("Server: {}", config.server.bind_addr);
    info!("Allowed origin: {}", config.server.allowed_origin);
    info!(
        "Rate limit: {} requests per {} ms",
        config.limits.requests_per_window, config.limits.window_ms
    );

    let api_key = config.api_key()?;
    let upstream = Arc::new(CompletionClient::new(&config.upstream, api_key)?);
    info!("Upstream: {} (model {})", upstream.url(), upstream.model());

    let limiter = Arc::new(RateLimiter::new(
        config.limits.requests_per_window,
        Duration::from_millis(config.limits.window_ms),
    ));
    let metrics = Arc::new(Metrics::new());

    // Periodic eviction of expired rate-limit windows
    let limiter_clone = limiter.clone();
    let sweep_interval = Duration::from_millis(config.limits.sweep_interval_ms);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            let removed = limiter_clone.sweep(Instant::now());
            debug!("Swept {} expired rate-limit entries, {} remain", removed, limiter_clone.len());
        }
    });

    tokio::spawn(metrics::run_metrics_server(
        config.metrics.clone(),
        metrics.clone(),
        limiter.clone(),
    ));

    let state = AppState::new(config.clone(), limiter, upstream, metrics)?;
    server::run(config, state).await?;

    Ok(())
}
