//! cc-api/src/middleware.rs
//!
//! Request tracing, CORS and security headers.

use std::time::Duration;

use axum::http::header::{
    HeaderName, HeaderValue, AUTHORIZATION, CONTENT_SECURITY_POLICY, CONTENT_TYPE, REFERRER_POLICY,
    X_CONTENT_TYPE_OPTIONS,
};
use axum::http::Method;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Embeds are limited to the three supported players.
pub const CONTENT_SECURITY_POLICY_VALUE: &str = "default-src 'self'; \
    frame-src https://www.youtube.com https://www.tiktok.com https://clips.twitch.tv https://player.twitch.tv; \
    img-src 'self' https: data:; frame-ancestors 'none'";

/// An empty origin list allows any origin. Unparseable entries are skipped.
pub fn cors_policy(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    if allowed_origins.is_empty() {
        return base.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}

fn security_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value))
}

/// Wraps the router with every standard layer.
pub fn with_middleware(router: Router, allowed_origins: &[String]) -> Router {
    router
        .layer(security_header(CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY_VALUE))
        .layer(security_header(X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .layer(security_header(REFERRER_POLICY, "strict-origin-when-cross-origin"))
        .layer(cors_policy(allowed_origins))
        .layer(TraceLayer::new_for_http())
}
