#[cfg(test)]
mod tests {
    use crate::error::{AppError, AppResult, FieldErrors, OptionExt};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};

    async fn body_json(err: AppError) -> (StatusCode, Value) {
        let res = err.into_response();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        assert_eq!(AppError::BadRequest("Invalid input".to_string()).to_string(), "Bad request: Invalid input");
        assert_eq!(AppError::RateLimited { retry_after_seconds: 60 }.to_string(), "Rate limited. Retry after 60 seconds");
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let (status, body) = body_json(AppError::NotFound("Book not found".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["message"], "Book not found");
        assert_eq!(body["status"], 404);
        assert!(chrono::DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_validation_details() {
        let mut errors = FieldErrors::new();
        errors.add("title", "This field is required.");
        errors.add("author", "This field is required.");
        errors.add("title", "Second message.");

        let (status, body) = body_json(AppError::Validation(errors)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["message"], "Validation failed for author, title");
        assert_eq!(
            body["error"]["details"]["fields"],
            json!({"author": ["This field is required."], "title": ["This field is required.", "Second message."]})
        );
    }

    #[tokio::test]
    async fn test_internal_error_hides_cause() {
        let (status, body) = body_json(AppError::Internal(anyhow::anyhow!("disk on fire"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert!(!body.to_string().contains("disk on fire"));
        assert!(body["error"]["details"]["error_id"].is_string());
    }

    #[tokio::test]
    async fn test_auth_statuses() {
        assert_eq!(body_json(AppError::Unauthorized("x".into())).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(AppError::Forbidden("x".into())).await.0, StatusCode::FORBIDDEN);
        let (status, body) = body_json(AppError::RateLimited { retry_after_seconds: 7 }).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["details"]["retry_after_seconds"], 7);
    }

    #[test]
    fn test_sqlx_conversions() {
        assert!(matches!(AppError::from(sqlx::Error::RowNotFound), AppError::NotFound(_)));
        assert!(matches!(AppError::from(sqlx::Error::PoolTimedOut), AppError::ServiceUnavailable(_)));
    }

    #[test]
    fn test_option_ext() {
        let found: AppResult<i32> = Some(1).ok_or_not_found("Book");
        assert_eq!(found.unwrap(), 1);
        let missing: AppResult<i32> = None.ok_or_not_found("Author");
        assert!(matches!(missing, Err(AppError::NotFound(msg)) if msg == "Author not found"));
    }

    #[test]
    fn test_empty_field_errors_pass() {
        assert!(FieldErrors::new().into_result().is_ok());
    }
}
