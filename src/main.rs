use std::net::SocketAddr;

use tokio::time::{self, Duration};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookshelf::{app, auth, config, db, state::AppState};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging: stdout plus a daily-rotated file under ./logs
    std::fs::create_dir_all("logs").ok();
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let file_appender = tracing_appender::rolling::daily("logs", "bookshelf.log");
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .init();
    // Dropping the guards would stop the writers from flushing
    let _log_guards = (stdout_guard, file_guard);

    // embedded defaults -> bookshelf.toml -> BOOKSHELF_CONFIG -> env/.env
    let app_cfg = config::load()?;

    let pool = db::connect(&app_cfg.database).await?;
    db::init_db(&pool).await?;
    info!("Database ready at {}", app_cfg.database.url);

    let state = AppState::new(pool.clone(), app_cfg.clone())?;

    if let Some(admin) = &app_cfg.auth.bootstrap_admin {
        auth::ensure_bootstrap_admin(&pool, &state.hasher, admin).await?;
    }

    // Rate-limit windows and expired sessions would otherwise grow without bound
    {
        let rl = state.rate_limiter.clone();
        let pool = pool.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(CLEANUP_INTERVAL);
            loop {
                ticker.tick().await;
                rl.cleanup_all().await;
                match auth::purge_expired_sessions(&pool).await {
                    Ok(0) => {}
                    Ok(n) => info!("Purged {} expired sessions", n),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
            }
        });
    }

    let router = app::build_router(state);

    let host = app_cfg.server.host.clone();
    let port = app_cfg.server.port;
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen addr {}:{} - {}", host, port, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Bookshelf listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received. Stopping server...");
}
