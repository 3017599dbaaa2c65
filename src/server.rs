use axum::{
    Router,
    body::to_bytes,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span, warn, Instrument};
use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::{Context, Result};
use uuid::Uuid;

use crate::config::Config;
use crate::error::RelayError;
use crate::metrics::Metrics;
use crate::protocol::{trim_history, ChatRequest, ReplyBody};
use crate::ratelimit::{RateLimiter, UNKNOWN_CLIENT};
use crate::upstream::{CompletionClient, UpstreamError};

#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub upstream: Arc<CompletionClient>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
    client_ip_header: HeaderName,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        limiter: Arc<RateLimiter>,
        upstream: Arc<CompletionClient>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let client_ip_header = HeaderName::from_bytes(config.server.client_ip_header.as_bytes())
            .with_context(|| format!("Invalid client IP header: {}", config.server.client_ip_header))?;

        Ok(Self { limiter, upstream, metrics, config, client_ip_header })
    }
}

/// Every path is the relay endpoint. All responses, errors included, carry
/// the CORS headers for the single trusted origin.
pub fn router(state: AppState) -> Result<Router> {
    let origin = HeaderValue::from_str(&state.config.server.allowed_origin)
        .with_context(|| format!("Invalid allowed origin: {}", state.config.server.allowed_origin))?;

    let app = Router::new()
        .fallback(relay)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            origin,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static("86400"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

pub async fn run(config: Arc<Config>, state: AppState) -> Result<()> {
    let app = router(state)?;

    let addr: SocketAddr = config.server.bind_addr.parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn relay(State(state): State<AppState>, request: Request) -> Response {
    state.metrics.inc_requests();

    let span = info_span!("relay", request_id = %Uuid::new_v4(), method = %request.method());
    async move {
        match handle(&state, request).await {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    RelayError::RateLimited(client) => warn!("Rate limit exceeded for client {}", client),
                    RelayError::UpstreamUnavailable(_) | RelayError::Internal(_) => error!("{}", err),
                    _ => debug!("{}", err),
                }
                state.metrics.record_error(&err);
                err.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn handle(state: &AppState, request: Request) -> Result<Response, RelayError> {
    let method = request.method().clone();

    // Preflight is answered before the rate limiter ever sees the client
    if method == Method::OPTIONS {
        state.metrics.inc_preflights();
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    if method != Method::POST {
        return Err(RelayError::MethodNotAllowed(method.to_string()));
    }

    let client = client_id(request.headers(), &state.client_ip_header);
    if !state.limiter.check(&client) {
        return Err(RelayError::RateLimited(client));
    }

    let body = to_bytes(request.into_body(), state.config.server.max_body_bytes)
        .await
        .map_err(|e| RelayError::InvalidRequest(format!("unreadable body: {}", e)))?;
    let chat = ChatRequest::parse(&body)?;
    let history = trim_history(&chat.messages, state.config.limits.max_history);

    debug!(
        "Forwarding {} of {} messages for client {}",
        history.len(),
        chat.messages.len(),
        client
    );

    let reply = state.upstream.complete(history).await.map_err(|e| match e {
        UpstreamError::Status { .. } => RelayError::UpstreamUnavailable(e.to_string()),
        other => RelayError::Internal(other.to_string()),
    })?;

    state.metrics.inc_replies();
    Ok((StatusCode::OK, Json(ReplyBody { reply })).into_response())
}

/// Rate-limit key for a request. Requests without the header share one bucket.
pub fn client_id(headers: &HeaderMap, ip_header: &HeaderName) -> String {
    headers
        .get(ip_header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("Failed to install signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
