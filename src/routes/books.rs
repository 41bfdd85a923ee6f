use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    Json,
};
use serde_json::{json, Value};
use sqlx::{QueryBuilder, Sqlite};

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult, OptionExt};
use crate::filters::BookFilter;
use crate::models::{Book, BOOK_SELECT};
use crate::query::{Ordering, Page, PageRequest, BOOK_ORDER_FIELDS};
use crate::routes::{parse_id, JsonBody};
use crate::serializers::{BookInput, Envelope, Mode};
use crate::state::AppState;

pub async fn list_books(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    uri: Uri,
) -> AppResult<Json<Page<Book>>> {
    let predicate = BookFilter::from_params(&params)?.predicate();
    let ordering = Ordering::parse(params.get("ordering").map(String::as_str), BOOK_ORDER_FIELDS, "title");
    let request = PageRequest::from_params(&params, &state.config.pagination)?;

    let mut count_qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM books b JOIN authors a ON a.id = b.author_id WHERE ");
    predicate.push_sql(&mut count_qb);
    let count: i64 = count_qb.build_query_scalar().fetch_one(&state.db).await?;
    let page = request.resolve(count)?;

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(BOOK_SELECT);
    qb.push(" WHERE ");
    predicate.push_sql(&mut qb);
    ordering.push_sql(&mut qb, "b.id");
    page.push_sql(&mut qb);
    let books = qb.build_query_as::<Book>().fetch_all(&state.db).await?;

    tracing::debug!(count, page = page.page, "Listed books");
    Ok(Json(Page::new(books, count, &page, &uri)))
}

pub async fn get_book(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Book>> {
    let id = parse_id(&id, "Book")?;
    Ok(Json(Book::find(&state.db, id).await?.ok_or_not_found("Book")?))
}

pub async fn create_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(body): JsonBody,
) -> AppResult<(StatusCode, Json<Envelope<Book>>)> {
    let input = BookInput::validate(&state.db, &body, Mode::Create).await?;
    let (Some(title), Some(year), Some(author_id)) = (input.title, input.publication_year, input.author_id) else {
        return Err(AppError::BadRequest("Incomplete book data".to_string()));
    };

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO books (title, publication_year, author_id) VALUES (?1, ?2, ?3) RETURNING id",
    )
    .bind(&title)
    .bind(year)
    .bind(author_id)
    .fetch_one(&state.db)
    .await?;
    let book = Book::find(&state.db, id).await?.ok_or_not_found("Book")?;

    state.metrics.inc_books_created();
    tracing::info!(book_id = id, user_id = user.id, "Book created");
    Ok((StatusCode::CREATED, Json(Envelope::new("Book created successfully", book))))
}

async fn update_book(state: AppState, user_id: i64, raw_id: &str, body: Value, mode: Mode) -> AppResult<Json<Envelope<Book>>> {
    let id = parse_id(raw_id, "Book")?;
    let existing = Book::find(&state.db, id).await?.ok_or_not_found("Book")?;
    let input = BookInput::validate(&state.db, &body, mode).await?;

    let title = input.title.unwrap_or(existing.title);
    let year = input.publication_year.unwrap_or(existing.publication_year);
    let author_id = input.author_id.unwrap_or(existing.author_id);
    sqlx::query("UPDATE books SET title = ?1, publication_year = ?2, author_id = ?3 WHERE id = ?4")
        .bind(&title)
        .bind(year)
        .bind(author_id)
        .bind(id)
        .execute(&state.db)
        .await?;
    let book = Book::find(&state.db, id).await?.ok_or_not_found("Book")?;

    state.metrics.inc_books_updated();
    tracing::info!(book_id = id, user_id, partial = mode == Mode::Partial, "Book updated");
    Ok(Json(Envelope::new("Book updated successfully", book)))
}

pub async fn replace_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody,
) -> AppResult<Json<Envelope<Book>>> {
    update_book(state, user.id, &id, body, Mode::Replace).await
}

pub async fn patch_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody,
) -> AppResult<Json<Envelope<Book>>> {
    update_book(state, user.id, &id, body, Mode::Partial).await
}

/// Responds 200 with a confirmation message rather than an empty 204, so
/// clients get the deleted title back.
pub async fn delete_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = parse_id(&id, "Book")?;
    let book = Book::find(&state.db, id).await?.ok_or_not_found("Book")?;
    sqlx::query("DELETE FROM books WHERE id = ?1").bind(id).execute(&state.db).await?;

    state.metrics.inc_books_deleted();
    tracing::info!(book_id = id, user_id = user.id, "Book deleted");
    Ok(Json(json!({ "message": format!("Book \"{}\" deleted successfully", book.title) })))
}
