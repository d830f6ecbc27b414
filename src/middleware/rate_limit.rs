use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::PeerIpKeyExtractor, GovernorError,
    GovernorLayer,
};

/// IP-keyed governor layer.
pub type IpGovernorLayer = GovernorLayer<
    PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    Body,
>;

fn ip_governor(per_ms: u64, burst: u32) -> IpGovernorLayer {
    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(burst)
            .finish()
            .expect("rate limit period and burst must be non-zero"),
    );

    GovernorLayer::new(config).error_handler(rate_limit_error_handler)
}

/// Outermost limiter, per client IP: 1000 requests per minute.
pub fn create_global_governor() -> IpGovernorLayer {
    ip_governor(60, 1000)
}

/// Unauthenticated routes (auth, fare quotes), per client IP: 100 requests per minute.
pub fn create_public_governor() -> IpGovernorLayer {
    ip_governor(600, 100)
}

/// JSON body in the same `{"error": ...}` shape as the rest of the API.
pub fn rate_limit_error_handler(error: GovernorError) -> Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, .. } => {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": format!("Too many requests, retry in {}s", wait_time)
                })),
            )
                .into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(wait_time));
            response
        }
        GovernorError::UnableToExtractKey => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unable to identify client for rate limiting" })),
        )
            .into_response(),
        other => {
            tracing::error!(error = ?other, "Rate limiter failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

/// Request/response logging keyed by client IP
pub async fn log_request(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    tracing::debug!(client_ip = %addr.ip(), %method, %uri, "Incoming request");

    let response = next.run(request).await;
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(client_ip = %addr.ip(), %method, %uri, %status, "Rate limited");
    } else if status.is_client_error() || status.is_server_error() {
        tracing::warn!(client_ip = %addr.ip(), %method, %uri, %status, "Request failed");
    } else {
        tracing::debug!(client_ip = %addr.ip(), %method, %uri, %status, "Request completed");
    }

    response
}
