#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use sqlx::{QueryBuilder, Sqlite};

    use crate::filters::AuthorFilter;
    use crate::models::{Author, AuthorRow};
    use crate::tests::support::{names, setup};

    #[tokio::test]
    async fn test_list_nests_books() {
        let app = setup().await;
        let catalog = app.seed_catalog().await;

        let res = app.get("/api/authors/").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["count"], 4);
        assert_eq!(names(&res.body), vec!["George Orwell", "J.K. Rowling", "Jane Austen", "Unpublished Author"]);

        let orwell = &res.body["results"][0];
        assert_eq!(orwell["id"], catalog.orwell);
        let books: Vec<&str> = orwell["books"].as_array().unwrap().iter().map(|b| b["title"].as_str().unwrap()).collect();
        assert_eq!(books, vec!["Animal Farm", "Nineteen Eighty-Four"]);
        assert_eq!(orwell["books"][0]["author"], catalog.orwell);

        assert_eq!(res.body["results"][3]["books"], json!([]));
    }

    #[tokio::test]
    async fn test_book_count_filters() {
        let app = setup().await;
        app.seed_catalog().await;

        let res = app.get("/api/authors/?book_count_min=2").await;
        assert_eq!(names(&res.body), vec!["George Orwell", "J.K. Rowling"]);

        let res = app.get("/api/authors/?book_count_max=0").await;
        assert_eq!(names(&res.body), vec!["Unpublished Author"]);

        let res = app.get("/api/authors/?book_count_min=1&book_count_max=2").await;
        assert_eq!(names(&res.body), vec!["George Orwell", "Jane Austen"]);

        let res = app.get("/api/authors/?book_count_min=many").await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body["error"]["details"]["fields"]["book_count_min"], json!(["Enter a number."]));
    }

    #[tokio::test]
    async fn test_search_lists_each_author_once() {
        let app = setup().await;
        let catalog = app.seed_catalog().await;

        // Two Rowling titles match
        let res = app.get("/api/authors/?search=harry").await;
        assert_eq!(res.body["count"], 1);
        assert_eq!(res.body["results"][0]["id"], catalog.rowling);

        let res = app.get("/api/authors/?search=orwell").await;
        assert_eq!(names(&res.body), vec!["George Orwell"]);

        let res = app.get("/api/authors/?name=JANE").await;
        assert_eq!(names(&res.body), vec!["Jane Austen"]);

        let res = app.get("/api/authors/?name_exact=jane%20austen").await;
        assert_eq!(res.body["count"], 0);
    }

    #[tokio::test]
    async fn test_ordering_and_paging() {
        let app = setup().await;
        app.seed_catalog().await;

        let res = app.get("/api/authors/?ordering=-name&page_size=3").await;
        assert_eq!(names(&res.body), vec!["Unpublished Author", "Jane Austen", "J.K. Rowling"]);
        assert_eq!(res.body["next"], "/api/authors/?ordering=-name&page_size=3&page=2");
    }

    #[tokio::test]
    async fn test_retrieve() {
        let app = setup().await;
        let catalog = app.seed_catalog().await;

        let res = app.get(&format!("/api/authors/{}/", catalog.austen)).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["name"], "Jane Austen");
        assert_eq!(res.body["books"].as_array().unwrap().len(), 1);

        let res = app.get("/api/authors/4242/").await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(res.body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_writes_require_staff() {
        let app = setup().await;
        let catalog = app.seed_catalog().await;
        let reader = app.token_for("reader", false).await;
        let body = json!({"name": "Ursula K. Le Guin"});

        let res = app.request(Method::POST, "/api/authors/", None, Some(body.clone())).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);

        let res = app.request(Method::POST, "/api/authors/", Some(&reader), Some(body.clone())).await;
        assert_eq!(res.status, StatusCode::FORBIDDEN);
        assert_eq!(res.body["error"]["code"], "FORBIDDEN");

        let res = app
            .request(Method::DELETE, &format!("/api/authors/{}/", catalog.austen), Some(&reader), None)
            .await;
        assert_eq!(res.status, StatusCode::FORBIDDEN);
        assert_eq!(app.get("/api/authors/").await.body["count"], 4);
    }

    #[tokio::test]
    async fn test_staff_crud() {
        let app = setup().await;
        let catalog = app.seed_catalog().await;
        let admin = app.token_for("librarian", true).await;

        let res = app
            .request(Method::POST, "/api/authors/", Some(&admin), Some(json!({"name": "  Ursula K. Le Guin "})))
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
        assert_eq!(res.body["message"], "Author created successfully");
        assert_eq!(res.body["data"]["name"], "Ursula K. Le Guin");
        assert_eq!(res.body["data"]["books"], json!([]));

        let res = app
            .request(Method::POST, "/api/authors/", Some(&admin), Some(json!({"name": "x".repeat(101)})))
            .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert!(res.body["error"]["details"]["fields"]["name"].is_array());

        let res = app
            .request(
                Method::PATCH,
                &format!("/api/authors/{}/", catalog.orwell),
                Some(&admin),
                Some(json!({"name": "Eric Blair"})),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["message"], "Author updated successfully");
        assert_eq!(res.body["data"]["name"], "Eric Blair");
        assert_eq!(res.body["data"]["books"].as_array().unwrap().len(), 2);

        let res = app
            .request(Method::PUT, &format!("/api/authors/{}/", catalog.orwell), Some(&admin), Some(json!({})))
            .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body["error"]["details"]["fields"]["name"], json!(["This field is required."]));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_books() {
        let app = setup().await;
        let catalog = app.seed_catalog().await;
        let admin = app.token_for("librarian", true).await;

        let res = app
            .request(Method::DELETE, &format!("/api/authors/{}/", catalog.rowling), Some(&admin), None)
            .await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["message"], "Author \"J.K. Rowling\" deleted successfully");

        assert_eq!(app.get(&format!("/api/authors/{}/", catalog.rowling)).await.status, StatusCode::NOT_FOUND);
        assert_eq!(
            app.get(&format!("/api/books/{}/", catalog.philosophers_stone)).await.status,
            StatusCode::NOT_FOUND
        );
        let res = app.get("/api/books/?author_name=rowling").await;
        assert_eq!(res.body["count"], 0);
        assert_eq!(app.get("/api/books/").await.body["count"], 3);
    }

    #[tokio::test]
    async fn test_search_matches_non_ascii_titles_once() {
        let app = setup().await;
        let marquez = app.add_author("Gabriel García Márquez").await;
        app.add_book("Cien años de soledad", 1967, marquez).await;
        app.add_book("El otoño del patriarca", 1975, marquez).await;

        let res = app.get("/api/authors/?search=%C3%B1o").await;
        assert_eq!(res.body["count"], 1);
        assert_eq!(names(&res.body), vec!["Gabriel García Márquez"]);

        let res = app.get("/api/authors/?name=GARC%C3%8DA").await;
        assert_eq!(res.body["count"], 0);
    }

    #[tokio::test]
    async fn test_predicate_matches_sql() {
        let app = setup().await;
        app.seed_catalog().await;
        let zola = app.add_author("Émile Zola").await;
        app.add_book("Germinal", 1885, zola).await;
        app.add_book("L'Œuvre", 1886, zola).await;
        let marquez = app.add_author("Gabriel García Márquez").await;
        app.add_book("Cien años de soledad", 1967, marquez).await;
        let rows: Vec<AuthorRow> = sqlx::query_as("SELECT id, name FROM authors").fetch_all(&app.state.db).await.unwrap();
        let all: Vec<Author> = Author::with_books(&app.state.db, rows).await.unwrap();

        let cases: Vec<Vec<(&str, &str)>> = vec![
            vec![],
            vec![("search", "the")],
            vec![("search", "a")],
            vec![("book_count_min", "1"), ("name", "j")],
            vec![("book_count_max", "2")],
            vec![("name_exact", "Jane Austen")],
            vec![("name", "ÉMILE")],
            vec![("name", "márquez")],
            vec![("search", "émile")],
            vec![("search", "AÑOS")],
            vec![("search", "Œuvre")],
            vec![("search", "germinal"), ("book_count_min", "2")],
        ];

        for case in cases {
            let params: HashMap<String, String> = case.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            let predicate = AuthorFilter::from_params(&params).unwrap().predicate();

            let mut expected: Vec<i64> = all.iter().filter(|a| predicate.matches(*a)).map(|a| a.id).collect();
            expected.sort_unstable();

            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT a.id FROM authors a WHERE ");
            predicate.push_sql(&mut qb);
            qb.push(" ORDER BY a.id");
            let actual: Vec<i64> = qb.build_query_scalar().fetch_all(&app.state.db).await.unwrap();

            assert_eq!(actual, expected, "params {:?}", case);
        }
    }
}
