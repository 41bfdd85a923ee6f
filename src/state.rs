use std::sync::Arc;

use crate::auth::Hasher;
use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::middleware::EndpointRateLimiter;

/// Shared application state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Arc<AppConfig>,
    pub hasher: Hasher,
    pub metrics: Metrics,
    /// Limits on the endpoints that accept credentials.
    pub rate_limiter: EndpointRateLimiter,
}

pub const CREDENTIAL_ENDPOINTS: [&str; 3] = ["/api/auth-token/", "/api/register/", "/api/auth/login/"];

impl AppState {
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> anyhow::Result<Self> {
        let hasher = Hasher::from_config(&config.auth)?;
        let limits = &config.rate_limit;
        let rate_limiter = EndpointRateLimiter::new().with_limits(
            CREDENTIAL_ENDPOINTS
                .iter()
                .map(|path| (*path, limits.auth_max_requests, limits.auth_window_secs))
                .collect(),
        );

        Ok(Self { db, config: Arc::new(config), hasher, metrics: Metrics::new(), rate_limiter })
    }
}
