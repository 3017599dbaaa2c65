use axum::{Router, routing::get};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::MetricsConfig;
use crate::error::RelayError;
use crate::ratelimit::RateLimiter;

#[derive(Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub preflights_total: AtomicU64,
    pub replies_total: AtomicU64,
    pub method_not_allowed: AtomicU64,
    pub rate_limits_hit: AtomicU64,
    pub invalid_requests: AtomicU64,
    pub upstream_failures: AtomicU64,
    pub internal_errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_preflights(&self) {
        self.preflights_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_replies(&self) {
        self.replies_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, err: &RelayError) {
        let counter = match err {
            RelayError::MethodNotAllowed(_) => &self.method_not_allowed,
            RelayError::RateLimited(_) => &self.rate_limits_hit,
            RelayError::InvalidRequest(_) => &self.invalid_requests,
            RelayError::UpstreamUnavailable(_) => &self.upstream_failures,
            RelayError::Internal(_) => &self.internal_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn format_prometheus(&self, tracked_clients: usize) -> String {
        format!(
            "# HELP relay_requests_total Total requests received\n\
             # TYPE relay_requests_total counter\n\
             relay_requests_total {}\n\
             # HELP relay_preflights_total CORS preflight requests answered\n\
             # TYPE relay_preflights_total counter\n\
             relay_preflights_total {}\n\
             # HELP relay_replies_total Successful replies\n\
             # TYPE relay_replies_total counter\n\
             relay_replies_total {}\n\
             # HELP relay_method_not_allowed_total Requests with an unsupported method\n\
             # TYPE relay_method_not_allowed_total counter\n\
             relay_method_not_allowed_total {}\n\
             # HELP relay_rate_limits_hit_total Requests denied by the rate limiter\n\
             # TYPE relay_rate_limits_hit_total counter\n\
             relay_rate_limits_hit_total {}\n\
             # HELP relay_invalid_requests_total Requests with a malformed body\n\
             # TYPE relay_invalid_requests_total counter\n\
             relay_invalid_requests_total {}\n\
             # HELP relay_upstream_failures_total Upstream non-success responses\n\
             # TYPE relay_upstream_failures_total counter\n\
             relay_upstream_failures_total {}\n\
             # HELP relay_internal_errors_total Requests failed by transport or decode errors\n\
             # TYPE relay_internal_errors_total counter\n\
             relay_internal_errors_total {}\n\
             # HELP relay_rate_limit_entries Clients tracked by the rate limiter\n\
             # TYPE relay_rate_limit_entries gauge\n\
             relay_rate_limit_entries {}\n",
            self.requests_total.load(Ordering::Relaxed),
            self.preflights_total.load(Ordering::Relaxed),
            self.replies_total.load(Ordering::Relaxed),
            self.method_not_allowed.load(Ordering::Relaxed),
            self.rate_limits_hit.load(Ordering::Relaxed),
            self.invalid_requests.load(Ordering::Relaxed),
            self.upstream_failures.load(Ordering::Relaxed),
            self.internal_errors.load(Ordering::Relaxed),
            tracked_clients,
        )
    }
}

pub async fn run_metrics_server(config: MetricsConfig, metrics: Arc<Metrics>, limiter: Arc<RateLimiter>) {
    if !config.enable {
        return;
    }

    let path = config.path.clone();
    let app = Router::new()
        .route(&path, get(move || {
            let m = metrics.clone();
            let l = limiter.clone();
            async move { m.format_prometheus(l.len()) }
        }));

    let addr: std::net::SocketAddr = match config.bind_addr.parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Invalid metrics bind address: {}", e);
            return;
        }
    };

    info!("Metrics server listening on {}{}", addr, path);

    match TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Metrics server stopped: {}", e);
            }
        }
        Err(e) => tracing::error!("Failed to bind metrics server on {}: {}", addr, e),
    }
}
