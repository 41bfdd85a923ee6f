//! Security and caching headers applied to every response.

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::{AppConfig, SecurityConfig};

/// Adds the fixed hardening headers, optional HSTS/CSP from the `security`
/// config section, and `no-store` on JSON bodies so clients never cache
/// catalog pages or tokens.
pub async fn security_headers_middleware(
    State(cfg): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    for (name, value) in [
        ("x-content-type-options", "nosniff"),
        ("x-frame-options", "DENY"),
        ("referrer-policy", "same-origin"),
        ("cross-origin-opener-policy", "same-origin"),
    ] {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    if let Some(sec) = cfg.security.as_ref() {
        apply_security_config(headers, sec);
    }

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if is_json {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    }

    res
}

fn apply_security_config(headers: &mut HeaderMap, sec: &SecurityConfig) {
    if sec.enable_hsts.unwrap_or(false) {
        let max_age = sec.hsts_max_age.unwrap_or(31_536_000);
        let include_sub = if sec.hsts_include_subdomains.unwrap_or(false) { "; includeSubDomains" } else { "" };
        match HeaderValue::from_str(&format!("max-age={}{}", max_age, include_sub)) {
            Ok(value) => {
                headers.insert(HeaderName::from_static("strict-transport-security"), value);
            }
            Err(e) => tracing::warn!("Skipping invalid HSTS header: {}", e),
        }
    }
    if let Some(csp) = sec.csp.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        match HeaderValue::from_str(csp) {
            Ok(value) => {
                headers.insert(HeaderName::from_static("content-security-policy"), value);
            }
            Err(e) => tracing::warn!("Skipping invalid CSP header: {}", e),
        }
    }
}
