use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    pub page_size: u32,
    pub max_page_size: u32,
}

/// Staff account created at startup when no user with that name exists yet.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub session_ttl_secs: u64,
    pub hash_memory_kib: u32,
    pub hash_iterations: u32,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub auth_max_requests: usize,
    pub auth_window_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
    /// Key rate limits on `X-Forwarded-For` / `X-Real-IP`. Only enable behind
    /// a reverse proxy that overwrites these headers.
    pub trust_proxy_headers: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pagination: PaginationConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub security: Option<SecurityConfig>,
}

impl AppConfig {
    pub fn trusts_proxy_headers(&self) -> bool {
        self.security.as_ref().and_then(|s| s.trust_proxy_headers).unwrap_or(false)
    }
}

const DEFAULTS: &str = include_str!("../config/default.toml");

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        // Optional local file: bookshelf.toml (in CWD)
        .add_source(::config::File::with_name("bookshelf").required(false));

    if let Ok(custom_path) = std::env::var("BOOKSHELF_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("BOOKSHELF").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    // Database
    if cfg.database.max_connections == 0 {
        return Err(anyhow::anyhow!("database.max_connections must be > 0"));
    }

    // Pagination
    if cfg.pagination.page_size == 0 {
        return Err(anyhow::anyhow!("pagination.page_size must be > 0"));
    }
    if cfg.pagination.max_page_size == 0 {
        return Err(anyhow::anyhow!("pagination.max_page_size must be > 0"));
    }
    if cfg.pagination.page_size > cfg.pagination.max_page_size {
        return Err(anyhow::anyhow!("pagination.page_size must be <= max_page_size"));
    }

    // Auth
    if cfg.auth.session_ttl_secs == 0 {
        return Err(anyhow::anyhow!("auth.session_ttl_secs must be > 0"));
    }
    // argon2 requires at least 8 KiB per lane and one pass
    if cfg.auth.hash_memory_kib < 8 {
        return Err(anyhow::anyhow!("auth.hash_memory_kib must be >= 8"));
    }
    if cfg.auth.hash_iterations == 0 {
        return Err(anyhow::anyhow!("auth.hash_iterations must be > 0"));
    }
    if let Some(admin) = &cfg.auth.bootstrap_admin {
        if admin.username.trim().is_empty() || admin.password.is_empty() {
            return Err(anyhow::anyhow!("auth.bootstrap_admin needs a username and a password"));
        }
    }

    // Rate limiting
    if cfg.rate_limit.auth_max_requests == 0 {
        return Err(anyhow::anyhow!("rate_limit.auth_max_requests must be > 0"));
    }
    if cfg.rate_limit.auth_window_secs == 0 {
        return Err(anyhow::anyhow!("rate_limit.auth_window_secs must be > 0"));
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    let path = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"));
    if let Some(path) = path {
        if path.starts_with(":memory:") || path.is_empty() {
            return Ok(());
        }
        // Drop query parameters such as ?mode=rwc
        let path = path.split('?').next().unwrap_or(path);
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
