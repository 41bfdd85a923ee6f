#[cfg(test)]
mod tests {
    use axum::http::{header, StatusCode};

    use crate::tests::support::setup;

    #[tokio::test]
    async fn test_healthz_endpoint() {
        let app = setup().await;
        let res = app.get("/healthz").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body, "ok");
    }

    #[tokio::test]
    async fn test_readyz_endpoint() {
        let app = setup().await;
        let res = app.get("/readyz").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body, "ready");
    }

    #[tokio::test]
    async fn test_version_endpoint() {
        let app = setup().await;
        let res = app.get("/version").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["name"], "bookshelf");
        assert!(res.body["version"].is_string());
        assert!(res.body["build"]["profile"].is_string());
    }

    #[tokio::test]
    async fn test_metrics_endpoints() {
        let app = setup().await;
        app.state.metrics.inc_books_created();

        let res = app.get("/metrics").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["books_created"], 1);
        assert_eq!(res.body["tokens_issued"], 0);
        assert!(res.body["uptime_seconds"].is_u64());

        let res = app.get("/metrics/prometheus").await;
        assert_eq!(res.status, StatusCode::OK);
        assert!(res.headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
        assert!(res.body.as_str().unwrap().contains("bookshelf_books_created_total 1"));
    }

    #[tokio::test]
    async fn test_security_headers() {
        let app = setup().await;
        let res = app.get("/api/books/").await;
        assert_eq!(res.headers["x-content-type-options"], "nosniff");
        assert_eq!(res.headers["x-frame-options"], "DENY");
        assert_eq!(res.headers[header::CACHE_CONTROL], "no-store");
        assert!(res.headers.get("strict-transport-security").is_none());
    }

    #[tokio::test]
    async fn test_hsts_when_configured() {
        let app = crate::tests::support::setup_with(|cfg| {
            cfg.security = Some(crate::config::SecurityConfig { enable_hsts: Some(true), ..Default::default() });
        })
        .await;
        let res = app.get("/healthz").await;
        assert_eq!(res.headers["strict-transport-security"], "max-age=31536000");
    }

    #[tokio::test]
    async fn test_api_overview() {
        let app = setup().await;
        for uri in ["/api/", "/api"] {
            let res = app.get(uri).await;
            assert_eq!(res.status, StatusCode::OK, "{}", uri);
            for section in ["Authentication", "Books API", "Authors API", "Advanced Query Capabilities", "Authentication Header"] {
                assert!(res.body.get(section).is_some(), "missing {}", section);
            }
            let query = &res.body["Advanced Query Capabilities"];
            for part in ["Filtering", "Searching", "Ordering", "Pagination"] {
                assert!(query.get(part).is_some(), "missing {}", part);
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = setup().await;
        assert_eq!(app.get("/api/nothing-here/").await.status, StatusCode::NOT_FOUND);
    }
}
