use super::ip::{client_ip, MaybeRemoteAddr};
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    net::IpAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::state::AppState;

/// Sliding-window limiter keyed by client IP.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<RwLock<HashMap<IpAddr, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_seconds),
        }
    }

    /// Records the request, or refuses it with the time until the oldest
    /// request in the window expires.
    pub async fn check_rate_limit(&self, ip: IpAddr) -> Result<(), AppError> {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        let timestamps = requests.entry(ip).or_default();

        // On clock skew keep the timestamp
        timestamps.retain(|&t| now.checked_duration_since(t).map(|d| d < self.window).unwrap_or(true));

        if timestamps.len() >= self.max_requests {
            let oldest = timestamps.first().copied().unwrap_or(now);
            let retry_after = now
                .checked_duration_since(oldest)
                .map(|elapsed| self.window.saturating_sub(elapsed))
                .unwrap_or(Duration::from_secs(1));
            tracing::warn!(%ip, retry_after = retry_after.as_secs(), "Rate limit exceeded");
            return Err(AppError::RateLimited { retry_after_seconds: retry_after.as_secs().max(1) });
        }

        timestamps.push(now);
        Ok(())
    }

    pub async fn cleanup_old_entries(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, timestamps| {
            timestamps.retain(|&t| now.checked_duration_since(t).map(|d| d < self.window).unwrap_or(true));
            !timestamps.is_empty()
        });
    }

    pub async fn tracked_clients(&self) -> usize {
        self.requests.read().await.len()
    }
}

/// One limiter per path; paths without an entry are not limited.
#[derive(Clone, Default)]
pub struct EndpointRateLimiter {
    limiters: Arc<HashMap<String, RateLimiter>>,
}

impl EndpointRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(self, limits: Vec<(&str, usize, u64)>) -> Self {
        let mut map: HashMap<String, RateLimiter> = self.limiters.as_ref().clone();
        for (endpoint, max_requests, window_seconds) in limits {
            map.insert(endpoint.to_string(), RateLimiter::new(max_requests, window_seconds));
        }
        Self { limiters: Arc::new(map) }
    }

    pub async fn check_endpoint_limit(&self, endpoint: &str, ip: IpAddr) -> Result<(), AppError> {
        match self.limiters.get(endpoint) {
            Some(limiter) => limiter.check_rate_limit(ip).await,
            None => Ok(()),
        }
    }

    pub async fn cleanup_all(&self) {
        for limiter in self.limiters.values() {
            limiter.cleanup_old_entries().await;
        }
    }
}

/// Limits credential submissions (`POST`) on the endpoints registered in the
/// state's [`EndpointRateLimiter`].
pub async fn endpoint_rate_limit(
    State(state): State<AppState>,
    MaybeRemoteAddr(peer): MaybeRemoteAddr,
    req: Request,
    next: Next,
) -> Response {
    if req.method() != Method::POST {
        return next.run(req).await;
    }
    let ip = client_ip(req.headers(), peer.map(|addr| addr.ip()), state.config.trusts_proxy_headers());
    match state.rate_limiter.check_endpoint_limit(req.uri().path(), ip).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}
