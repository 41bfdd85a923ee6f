//! Router assembly shared by the binary and the tests.

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware;
use crate::routes::{auth, authors, books, health, overview};
use crate::state::AppState;

const BODY_LIMIT_BYTES: usize = 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let cfg = state.config.clone();
    let app = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .route("/api", get(overview::api_overview))
        .route("/api/", get(overview::api_overview))
        .route("/api/auth-token/", post(auth::obtain_token).delete(auth::revoke_token))
        .route("/api/register/", post(auth::register))
        .route("/api/auth/login/", post(auth::login))
        .route("/api/auth/logout/", post(auth::logout))
        .route("/api/books/", get(books::list_books).post(books::create_book))
        .route("/api/books/create/", post(books::create_book))
        .route(
            "/api/books/{id}/",
            get(books::get_book).put(books::replace_book).patch(books::patch_book).delete(books::delete_book),
        )
        .route("/api/books/{id}/update/", put(books::replace_book).patch(books::patch_book))
        .route("/api/books/{id}/delete/", delete(books::delete_book))
        .route("/api/authors/", get(authors::list_authors).post(authors::create_author))
        .route(
            "/api/authors/{id}/",
            get(authors::get_author)
                .put(authors::replace_author)
                .patch(authors::patch_author)
                .delete(authors::delete_author),
        )
        .layer(from_fn_with_state(state.clone(), middleware::auth::authenticate))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit::endpoint_rate_limit))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg, middleware::security_headers::security_headers_middleware));

    // Permissive CORS only for local development against a separate frontend
    if cfg!(debug_assertions) {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
