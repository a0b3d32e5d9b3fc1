use axum::{
    Json,
    extract::{ConnectInfo, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use fireworks_hub::HubError;
use serde::Serialize;
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::AppState;
use crate::ws;

/// WebSocket endpoint at `/ws`.
pub async fn websocket_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let client = client_ip(&headers, addr);

    if state.config.check_origin && !origin_matches(&headers) {
        let err = HubError::Upgrade(format!(
            "origin {:?} does not match host",
            headers.get(header::ORIGIN)
        ));
        warn!(client = %client, "Couldn't upgrade connection: {}", err);
        return (StatusCode::FORBIDDEN, err.to_string()).into_response();
    }

    info!(client = %client, "Websocket connection established");
    let failed_client = client.clone();
    ws.on_failed_upgrade(move |e: axum::Error| {
        warn!(
            client = %failed_client,
            "Couldn't upgrade connection: {}",
            HubError::Upgrade(e.to_string())
        );
    })
    .on_upgrade(move |socket| ws::handle_socket(socket, state, client))
}

/// Client address for logging: first `X-Forwarded-For` hop, else the peer.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.to_string())
}

/// Same-origin check: the `Origin` authority must equal `Host`. Requests
/// without an `Origin` header are not from browsers and pass.
pub fn origin_matches(headers: &HeaderMap) -> bool {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return true;
    };
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    let Some(host) = headers.get(header::HOST).and_then(|h| h.to_str().ok()) else {
        return false;
    };

    let authority = origin
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(origin);
    let authority = authority.split('/').next().unwrap_or_default();
    authority.eq_ignore_ascii_case(host)
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: usize,
    pub backlog_len: usize,
    pub uptime_secs: u64,
}

/// Health check endpoint - returns hub status
pub async fn health_handler(State(state): State<AppState>) -> Response {
    match state.hub.stats().await {
        Ok(stats) => Json(HealthStatus {
            status: "healthy".to_string(),
            connections: stats.connections,
            backlog_len: stats.backlog_len,
            uptime_secs: state.hub.metrics().uptime_secs(),
        })
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unavailable",
                "error": e.to_string(),
            })),
        )
            .into_response(),
    }
}

/// Metrics endpoint - returns hub counters
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.metrics().snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(*v));
        }
        map
    }

    fn peer() -> SocketAddr {
        "10.0.0.7:51000".parse().unwrap()
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let h = headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        assert_eq!(client_ip(&h, peer()), "203.0.113.9");
    }

    #[test]
    fn client_ip_falls_back_to_peer() {
        assert_eq!(client_ip(&HeaderMap::new(), peer()), "10.0.0.7:51000");
        let h = headers(&[("x-forwarded-for", "  ")]);
        assert_eq!(client_ip(&h, peer()), "10.0.0.7:51000");
    }

    #[test]
    fn same_origin_passes() {
        let h = headers(&[
            ("origin", "http://fireworks.example:8080"),
            ("host", "fireworks.example:8080"),
        ]);
        assert!(origin_matches(&h));

        let h = headers(&[
            ("origin", "https://Fireworks.Example"),
            ("host", "fireworks.example"),
        ]);
        assert!(origin_matches(&h));
    }

    #[test]
    fn cross_origin_fails() {
        let h = headers(&[
            ("origin", "http://evil.example"),
            ("host", "fireworks.example"),
        ]);
        assert!(!origin_matches(&h));

        let h = headers(&[("origin", "http://fireworks.example")]);
        assert!(!origin_matches(&h));
    }

    #[test]
    fn missing_origin_passes() {
        let h = headers(&[("host", "fireworks.example")]);
        assert!(origin_matches(&h));
    }
}
