use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::{self, DatabaseConfig};

/// Opens the connection pool described by `cfg`.
///
/// Foreign keys are switched on for every connection so that deleting an
/// author cascades to its books. An in-memory database lives only as long as
/// its connection, so it is pinned to a single connection that never expires.
pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    config::ensure_sqlite_parent_dir(&cfg.url)?;

    let options = SqliteConnectOptions::from_str(&cfg.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(10));

    let in_memory = cfg.url.contains(":memory:");
    let mut pool_options = SqlitePoolOptions::new();
    if in_memory {
        pool_options = pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    } else {
        pool_options = pool_options.max_connections(cfg.max_connections);
    }

    Ok(pool_options.connect_with(options).await?)
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    // Pragmas for better durability/performance
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA synchronous=NORMAL;").execute(pool).await {
        tracing::warn!("Failed to set synchronous mode: {}", e);
    }
    // Cascading deletes depend on this one
    sqlx::query("PRAGMA foreign_keys=ON;").execute(pool).await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS authors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            publication_year INTEGER NOT NULL DEFAULT 2020,
            author_id INTEGER NOT NULL,
            FOREIGN KEY(author_id) REFERENCES authors(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL DEFAULT '',
            password_hash TEXT NOT NULL,
            is_staff INTEGER NOT NULL DEFAULT 0,
            date_joined TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
        )"#,
    )
    .execute(pool)
    .await?;

    // One token per user
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS tokens (
            key TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL UNIQUE,
            created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    // expires_at is a unix timestamp in seconds
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS sessions (
            key TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        ("idx_books_author_id", "CREATE INDEX IF NOT EXISTS idx_books_author_id ON books(author_id)"),
        ("idx_books_title", "CREATE INDEX IF NOT EXISTS idx_books_title ON books(title)"),
        (
            "idx_books_publication_year",
            "CREATE INDEX IF NOT EXISTS idx_books_publication_year ON books(publication_year)",
        ),
        ("idx_authors_name", "CREATE INDEX IF NOT EXISTS idx_authors_name ON authors(name)"),
        ("idx_sessions_user_id", "CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)"),
        ("idx_sessions_expires_at", "CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at)"),
    ];
    for (name, ddl) in indexes {
        if let Err(e) = sqlx::query(ddl).execute(pool).await {
            tracing::warn!("Failed to create index {}: {}", name, e);
        }
    }

    Ok(())
}
