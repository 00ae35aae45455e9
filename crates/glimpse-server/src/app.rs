//! Shared state and the axum router.

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::get;
use glimpse_auth::TokenValidator;
use glimpse_relay::RelayEngine;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::connection;

/// State shared by every handler.
pub struct AppState {
    /// The relay engine.
    pub engine: RelayEngine,
    /// Bearer-token validation capability.
    pub validator: Arc<dyn TokenValidator>,
    /// Honor `X-Forwarded-For` from a fronting proxy.
    pub trust_proxy_headers: bool,
    /// Maximum accepted WebSocket message size, bytes.
    pub max_message_size: usize,
}

/// Build the router: the WebSocket upgrade route and a health probe.
///
/// CORS is wide open when the configured origins contain `*`; the
/// relay carries opaque media and its security lives in tokens and
/// room credentials, not origin checks.
pub fn router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let cors = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin, "ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/screenshare", get(connection::ws_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use glimpse_audit::TracingAuditSink;
    use glimpse_auth::StaticTokenValidator;
    use glimpse_limits::{IpThrottle, LockoutConfig, MemoryBlockedIpStore, RateLimitConfig, RateLimiter};
    use glimpse_relay::EngineConfig;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let engine = RelayEngine::new(
            EngineConfig::default(),
            Arc::new(RateLimiter::new(RateLimitConfig::default())),
            Arc::new(IpThrottle::new(
                Box::new(MemoryBlockedIpStore::default()),
                LockoutConfig::default(),
            )),
            Arc::new(TracingAuditSink),
        );
        Arc::new(AppState {
            engine,
            validator: Arc::new(StaticTokenValidator::default()),
            trust_proxy_headers: false,
            max_message_size: 10 * 1024 * 1024,
        })
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = router(state(), &["*".to_owned()]);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cors_allows_any_origin_with_wildcard() {
        let app = router(state(), &["*".to_owned()]);
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/health")
                    .header("Origin", "http://example.com")
                    .header("Access-Control-Request-Method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let allow = response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap_or(""));
        assert_eq!(allow, Some("*"));
    }

    #[tokio::test]
    async fn screenshare_without_upgrade_is_rejected() {
        let app = router(state(), &["*".to_owned()]);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/screenshare?token=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // A plain GET is not a WebSocket handshake.
        assert_ne!(response.status(), StatusCode::OK);
    }
}
