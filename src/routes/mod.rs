//! HTTP handlers, one sub-module per resource.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde_json::Value;

use crate::error::{AppError, AppResult};

pub mod auth;
pub mod authors;
pub mod books;
pub mod health;
pub mod overview;

/// A JSON request body whose parse failures use the application error
/// envelope instead of axum's plain-text rejection.
pub struct JsonBody(pub Value);

impl<S: Send + Sync> FromRequest<S> for JsonBody {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<Value>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            AppError::BadRequest("Expected request with `Content-Type: application/json`".to_string())
        }
        other => AppError::BadRequest(format!("JSON parse error - {}", other.body_text())),
    }
}

/// Primary keys in paths; anything that is not a positive integer matches
/// no record.
pub fn parse_id(raw: &str, entity: &str) -> AppResult<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
}
