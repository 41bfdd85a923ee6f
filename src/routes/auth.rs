use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::auth::{self, CurrentUser, Identity};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{cleared_session_cookie, session_cookie};
use crate::models::User;
use crate::routes::JsonBody;
use crate::serializers::{Credentials, Envelope, Registration};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub is_staff: bool,
}

async fn verified_user(state: &AppState, body: &Value) -> AppResult<User> {
    let creds = Credentials::validate(body)?;
    auth::check_credentials(&state.db, &state.hasher, &creds.username, &creds.password)
        .await
        .inspect_err(|_| state.metrics.inc_auth_failures())
}

/// Issues the caller's API token, or returns the existing one.
pub async fn obtain_token(State(state): State<AppState>, JsonBody(body): JsonBody) -> AppResult<Json<TokenResponse>> {
    let user = verified_user(&state, &body).await?;
    let (token, created) = auth::get_or_create_token(&state.db, user.id).await?;
    if created {
        state.metrics.inc_tokens_issued();
        tracing::info!(user_id = user.id, "API token issued");
    }
    Ok(Json(TokenResponse { token, user_id: user.id, username: user.username, email: user.email, is_staff: user.is_staff }))
}

pub async fn revoke_token(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> AppResult<Json<Value>> {
    let revoked = auth::revoke_token(&state.db, user.id).await?;
    tracing::info!(user_id = user.id, revoked, "API token revoked");
    let message = if revoked { "Token revoked successfully" } else { "No token to revoke" };
    Ok(Json(json!({ "message": message })))
}

pub async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody,
) -> AppResult<(StatusCode, Json<Envelope<User>>)> {
    let reg = Registration::validate(&body)?;
    let user = auth::create_user(&state.db, &state.hasher, &reg.username, &reg.email, &reg.password, false).await?;
    state.metrics.inc_users_registered();
    Ok((StatusCode::CREATED, Json(Envelope::new("User registered successfully", user))))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody,
) -> AppResult<(HeaderMap, Json<Envelope<User>>)> {
    let user = verified_user(&state, &body).await?;
    let ttl = state.config.auth.session_ttl_secs;
    let key = auth::create_session(&state.db, user.id, ttl).await?;
    let cookie = session_cookie(key, ttl)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("session cookie is not a valid header value")))?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    state.metrics.inc_logins();
    tracing::info!(user_id = user.id, "Session login");
    Ok((headers, Json(Envelope::new("Login successful", user))))
}

/// Ends the cookie session, if any. Always clears the cookie.
pub async fn logout(State(state): State<AppState>, identity: Identity) -> AppResult<(HeaderMap, Json<Value>)> {
    if let Some(key) = identity.session_key() {
        auth::delete_session(&state.db, key).await?;
        if let Some(user) = &identity.user {
            tracing::info!(user_id = user.id, "Session logout");
        }
    }
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cleared_session_cookie());
    Ok((headers, Json(json!({ "message": "Logged out successfully" }))))
}
