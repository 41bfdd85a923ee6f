use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::app::build_router;
use crate::auth;
use crate::config::AppConfig;
use crate::db;
use crate::state::AppState;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: TempDir,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Primary keys of the seeded catalog.
pub struct Catalog {
    pub rowling: i64,
    pub orwell: i64,
    pub austen: i64,
    pub unpublished: i64,
    pub animal_farm: i64,
    pub philosophers_stone: i64,
}

pub async fn setup() -> TestApp {
    setup_with(|_| {}).await
}

pub async fn setup_with(tweak: impl FnOnce(&mut AppConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = AppConfig::default();
    cfg.database.url = format!("sqlite://{}", dir.path().join("bookshelf-test.db").display());
    cfg.database.max_connections = 4;
    cfg.auth.hash_memory_kib = 64;
    cfg.auth.hash_iterations = 1;
    cfg.rate_limit.auth_max_requests = 1000;
    tweak(&mut cfg);

    let pool = db::connect(&cfg.database).await.unwrap();
    db::init_db(&pool).await.unwrap();
    let state = AppState::new(pool, cfg).unwrap();
    TestApp { router: build_router(state.clone()), state, _dir: dir }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Response {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Response { status, headers, body }
    }

    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Token {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.request(Method::GET, uri, None, None).await
    }

    /// Creates an account directly and returns its API token.
    pub async fn token_for(&self, username: &str, is_staff: bool) -> String {
        let user = auth::create_user(&self.state.db, &self.state.hasher, username, "", "testpass123", is_staff)
            .await
            .unwrap();
        auth::get_or_create_token(&self.state.db, user.id).await.unwrap().0
    }

    pub async fn add_author(&self, name: &str) -> i64 {
        sqlx::query_scalar("INSERT INTO authors (name) VALUES (?1) RETURNING id")
            .bind(name)
            .fetch_one(&self.state.db)
            .await
            .unwrap()
    }

    pub async fn add_book(&self, title: &str, year: i64, author_id: i64) -> i64 {
        sqlx::query_scalar("INSERT INTO books (title, publication_year, author_id) VALUES (?1, ?2, ?3) RETURNING id")
            .bind(title)
            .bind(year)
            .bind(author_id)
            .fetch_one(&self.state.db)
            .await
            .unwrap()
    }

    /// Four authors (one without books) and six books.
    pub async fn seed_catalog(&self) -> Catalog {
        let rowling = self.add_author("J.K. Rowling").await;
        let orwell = self.add_author("George Orwell").await;
        let austen = self.add_author("Jane Austen").await;
        let unpublished = self.add_author("Unpublished Author").await;

        let philosophers_stone = self.add_book("Harry Potter and the Philosopher's Stone", 1997, rowling).await;
        self.add_book("Harry Potter and the Chamber of Secrets", 1998, rowling).await;
        self.add_book("The Casual Vacancy", 2012, rowling).await;
        self.add_book("Nineteen Eighty-Four", 1949, orwell).await;
        let animal_farm = self.add_book("Animal Farm", 1945, orwell).await;
        self.add_book("Pride and Prejudice", 1813, austen).await;

        Catalog { rowling, orwell, austen, unpublished, animal_farm, philosophers_stone }
    }
}

pub fn titles(page: &Value) -> Vec<String> {
    page["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["title"].as_str().unwrap().to_string())
        .collect()
}

pub fn names(page: &Value) -> Vec<String> {
    page["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap().to_string())
        .collect()
}
