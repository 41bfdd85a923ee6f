//! Accounts, password hashing, API tokens and sessions.
//!
//! Requests are authenticated by [`crate::middleware::auth::authenticate`],
//! which stores an [`Identity`] in the request extensions. Handlers that
//! write take a [`CurrentUser`] or [`StaffUser`] argument; both reject the
//! request before the handler body runs.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{AuthConfig, BootstrapAdmin};
use crate::error::{AppError, AppResult};
use crate::models::{User, USER_COLUMNS};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,
    #[error("Invalid token.")]
    InvalidToken,
    #[error("Invalid token header. No credentials provided.")]
    MalformedHeader,
    #[error("Unable to log in with provided credentials.")]
    InvalidCredentials,
    #[error("You do not have permission to perform this action.")]
    PermissionDenied,
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotAuthenticated | AuthError::InvalidToken | AuthError::MalformedHeader => {
                AppError::Unauthorized(err.to_string())
            }
            AuthError::InvalidCredentials => AppError::field("non_field_errors", err.to_string()),
            AuthError::PermissionDenied => AppError::Forbidden(err.to_string()),
        }
    }
}

/// Argon2id with the cost parameters from configuration.
#[derive(Clone)]
pub struct Hasher {
    params: Params,
    /// Hash of a throwaway password with the same cost, checked when the
    /// username is unknown.
    dummy_hash: Arc<str>,
}

impl Hasher {
    pub fn from_config(cfg: &AuthConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.hash_memory_kib, cfg.hash_iterations, 1, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 parameters: {}", e))?;
        let mut hasher = Self { params, dummy_hash: Arc::from("") };
        let dummy = hasher
            .hash(&generate_token_key())
            .map_err(|e| anyhow::anyhow!("failed to prepare dummy password hash: {}", e))?;
        hasher.dummy_hash = Arc::from(dummy);
        Ok(hasher)
    }

    pub fn dummy_hash(&self) -> &str {
        &self.dummy_hash
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())?;
        Ok(self.argon2().hash_password(password.as_bytes(), &salt)?.to_string())
    }

    /// Malformed stored hashes never verify.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self.argon2().verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                tracing::warn!("Stored password hash is unreadable: {}", e);
                false
            }
        }
    }

    /// Hashing is CPU bound; keep it off the async workers.
    pub async fn hash_blocking(&self, password: String) -> AppResult<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("hashing task failed: {}", e)))?
    }

    pub async fn verify_blocking(&self, password: String, hash: String) -> AppResult<bool> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("verification task failed: {}", e)))
    }
}

/// 40 lowercase hex characters.
pub fn generate_token_key() -> String {
    let mut key = Uuid::new_v4().simple().to_string();
    key.push_str(&Uuid::new_v4().simple().to_string()[..8]);
    key
}

pub async fn create_user(
    pool: &SqlitePool,
    hasher: &Hasher,
    username: &str,
    email: &str,
    password: &str,
    is_staff: bool,
) -> AppResult<User> {
    if User::find_by_username(pool, username).await?.is_some() {
        return Err(AppError::field("username", "A user with that username already exists."));
    }
    let password_hash = hasher.hash_blocking(password.to_string()).await?;
    let inserted = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, email, password_hash, is_staff) VALUES (?1, ?2, ?3, ?4) RETURNING {}",
        USER_COLUMNS
    ))
    .bind(username)
    .bind(email)
    .bind(&password_hash)
    .bind(is_staff)
    .fetch_one(pool)
    .await;

    match inserted {
        Ok(user) => {
            tracing::info!(user_id = user.id, username = %user.username, "User created");
            Ok(user)
        }
        // Lost a race against a concurrent registration
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(AppError::field("username", "A user with that username already exists."))
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolves a username/password pair to its user.
pub async fn check_credentials(pool: &SqlitePool, hasher: &Hasher, username: &str, password: &str) -> AppResult<User> {
    let Some(user) = User::find_by_username(pool, username).await? else {
        tracing::debug!(username, "Login for unknown user");
        // Same Argon2 work as a real check
        hasher.verify_blocking(password.to_string(), hasher.dummy_hash().to_string()).await?;
        return Err(AuthError::InvalidCredentials.into());
    };
    if !hasher.verify_blocking(password.to_string(), user.password_hash.clone()).await? {
        tracing::warn!(user_id = user.id, "Login with wrong password");
        return Err(AuthError::InvalidCredentials.into());
    }
    Ok(user)
}

/// Returns the user's token, creating it on first use. The flag is `true`
/// when a new token was issued.
pub async fn get_or_create_token(pool: &SqlitePool, user_id: i64) -> sqlx::Result<(String, bool)> {
    let created = sqlx::query("INSERT INTO tokens (key, user_id) VALUES (?1, ?2) ON CONFLICT(user_id) DO NOTHING")
        .bind(generate_token_key())
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected()
        == 1;
    let key: String = sqlx::query_scalar("SELECT key FROM tokens WHERE user_id = ?1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok((key, created))
}

pub async fn revoke_token(pool: &SqlitePool, user_id: i64) -> sqlx::Result<bool> {
    let res = sqlx::query("DELETE FROM tokens WHERE user_id = ?1").bind(user_id).execute(pool).await?;
    Ok(res.rows_affected() > 0)
}

pub async fn user_for_token(pool: &SqlitePool, key: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(
        "SELECT u.id, u.username, u.email, u.password_hash, u.is_staff, u.date_joined \
         FROM tokens t JOIN users u ON u.id = t.user_id WHERE t.key = ?1",
    )
    .bind(key)
    .fetch_optional(pool)
    .await
}

pub async fn create_session(pool: &SqlitePool, user_id: i64, ttl_secs: u64) -> sqlx::Result<String> {
    let key = Uuid::new_v4().simple().to_string();
    let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
    let expires_at = chrono::Utc::now().timestamp().saturating_add(ttl);
    sqlx::query("INSERT INTO sessions (key, user_id, expires_at) VALUES (?1, ?2, ?3)")
        .bind(&key)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await?;
    Ok(key)
}

/// Expired sessions resolve to nobody.
pub async fn user_for_session(pool: &SqlitePool, key: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(
        "SELECT u.id, u.username, u.email, u.password_hash, u.is_staff, u.date_joined \
         FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.key = ?1 AND s.expires_at > ?2",
    )
    .bind(key)
    .bind(chrono::Utc::now().timestamp())
    .fetch_optional(pool)
    .await
}

pub async fn delete_session(pool: &SqlitePool, key: &str) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM sessions WHERE key = ?1").bind(key).execute(pool).await?;
    Ok(())
}

pub async fn purge_expired_sessions(pool: &SqlitePool) -> sqlx::Result<u64> {
    let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
        .bind(chrono::Utc::now().timestamp())
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Creates the configured staff account unless the username is taken.
pub async fn ensure_bootstrap_admin(pool: &SqlitePool, hasher: &Hasher, admin: &BootstrapAdmin) -> anyhow::Result<()> {
    if User::find_by_username(pool, &admin.username).await?.is_some() {
        tracing::debug!(username = %admin.username, "Bootstrap admin already present");
        return Ok(());
    }
    create_user(pool, hasher, &admin.username, &admin.email, &admin.password, true)
        .await
        .map_err(|e| anyhow::anyhow!("failed to create bootstrap admin: {}", e))?;
    tracing::info!(username = %admin.username, "Bootstrap admin created");
    Ok(())
}

/// How the current request proved who it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Token(String),
    Session(String),
}

/// Request extension set by the authentication middleware; anonymous
/// requests carry the default (no user).
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub user: Option<User>,
    pub credential: Option<Credential>,
}

impl Identity {
    pub fn session_key(&self) -> Option<&str> {
        match &self.credential {
            Some(Credential::Session(key)) => Some(key),
            _ => None,
        }
    }
}

fn identity(parts: &Parts) -> Identity {
    parts.extensions.get::<Identity>().cloned().unwrap_or_default()
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(identity(parts))
    }
}

/// Any authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity(parts).user.map(CurrentUser).ok_or_else(|| AuthError::NotAuthenticated.into())
    }
}

/// An authenticated user with the staff flag.
#[derive(Debug, Clone)]
pub struct StaffUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match identity(parts).user {
            None => Err(AuthError::NotAuthenticated.into()),
            Some(user) if !user.is_staff => {
                tracing::warn!(user_id = user.id, "Staff-only operation refused");
                Err(AuthError::PermissionDenied.into())
            }
            Some(user) => Ok(StaffUser(user)),
        }
    }
}
