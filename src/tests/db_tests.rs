#[cfg(test)]
mod tests {
    use crate::config::DatabaseConfig;
    use crate::db;
    use tempfile::TempDir;

    async fn setup_test_db() -> (sqlx::SqlitePool, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("db-test.db").display()),
            max_connections: 2,
        };
        let pool = db::connect(&cfg).await.unwrap();
        db::init_db(&pool).await.unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn test_init_db_creates_tables() {
        let (pool, _dir) = setup_test_db().await;
        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        for table in ["authors", "books", "sessions", "tokens", "users"] {
            assert!(tables.iter().any(|t| t == table), "missing table {}", table);
        }

        // Idempotent
        db::init_db(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let cfg = DatabaseConfig { url: "sqlite::memory:".to_string(), max_connections: 8 };
        let pool = db::connect(&cfg).await.unwrap();
        db::init_db(&pool).await.unwrap();
        sqlx::query("INSERT INTO authors (name) VALUES ('Kept')").execute(&pool).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authors").fetch_one(&pool).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_cascade_and_foreign_keys() {
        let (pool, _dir) = setup_test_db().await;
        let author: i64 = sqlx::query_scalar("INSERT INTO authors (name) VALUES ('Cascade') RETURNING id")
            .fetch_one(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO books (title, author_id) VALUES ('One', ?1), ('Two', ?1)")
            .bind(author)
            .execute(&pool)
            .await
            .unwrap();

        let year: i64 = sqlx::query_scalar("SELECT publication_year FROM books LIMIT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(year, 2020);

        let orphan = sqlx::query("INSERT INTO books (title, author_id) VALUES ('Orphan', 9999)").execute(&pool).await;
        assert!(orphan.is_err());

        sqlx::query("DELETE FROM authors WHERE id = ?1").bind(author).execute(&pool).await.unwrap();
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books").fetch_one(&pool).await.unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_one_token_per_user() {
        let (pool, _dir) = setup_test_db().await;
        let user: i64 =
            sqlx::query_scalar("INSERT INTO users (username, password_hash) VALUES ('u', 'x') RETURNING id")
                .fetch_one(&pool)
                .await
                .unwrap();
        sqlx::query("INSERT INTO tokens (key, user_id) VALUES ('k1', ?1)").bind(user).execute(&pool).await.unwrap();
        let dup = sqlx::query("INSERT INTO tokens (key, user_id) VALUES ('k2', ?1)").bind(user).execute(&pool).await;
        assert!(dup.is_err());

        let (key, created) = crate::auth::get_or_create_token(&pool, user).await.unwrap();
        assert_eq!(key, "k1");
        assert!(!created);
    }
}
