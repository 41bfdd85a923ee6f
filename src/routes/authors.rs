use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    Json,
};
use serde_json::{json, Value};
use sqlx::{QueryBuilder, Sqlite};

use crate::auth::StaffUser;
use crate::error::{AppResult, OptionExt};
use crate::filters::AuthorFilter;
use crate::models::{Author, AuthorRow};
use crate::query::{Ordering, Page, PageRequest, AUTHOR_ORDER_FIELDS};
use crate::routes::{parse_id, JsonBody};
use crate::serializers::{AuthorInput, Envelope, Mode};
use crate::state::AppState;

/// Authors with their nested books. `search` may match several books of one
/// author; the predicate renders related-book lookups as `EXISTS`, so each
/// author is still listed once.
pub async fn list_authors(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    uri: Uri,
) -> AppResult<Json<Page<Author>>> {
    let predicate = AuthorFilter::from_params(&params)?.predicate();
    let ordering = Ordering::parse(params.get("ordering").map(String::as_str), AUTHOR_ORDER_FIELDS, "name");
    let request = PageRequest::from_params(&params, &state.config.pagination)?;

    let mut count_qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM authors a WHERE ");
    predicate.push_sql(&mut count_qb);
    let count: i64 = count_qb.build_query_scalar().fetch_one(&state.db).await?;
    let page = request.resolve(count)?;

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT a.id, a.name FROM authors a WHERE ");
    predicate.push_sql(&mut qb);
    ordering.push_sql(&mut qb, "a.id");
    page.push_sql(&mut qb);
    let rows = qb.build_query_as::<AuthorRow>().fetch_all(&state.db).await?;
    let authors = Author::with_books(&state.db, rows).await?;

    Ok(Json(Page::new(authors, count, &page, &uri)))
}

pub async fn get_author(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Author>> {
    let id = parse_id(&id, "Author")?;
    Ok(Json(Author::find(&state.db, id).await?.ok_or_not_found("Author")?))
}

pub async fn create_author(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    JsonBody(body): JsonBody,
) -> AppResult<(StatusCode, Json<Envelope<Author>>)> {
    let input = AuthorInput::validate(&body, Mode::Create)?;
    let name = input.name.unwrap_or_default();
    let id: i64 = sqlx::query_scalar("INSERT INTO authors (name) VALUES (?1) RETURNING id")
        .bind(&name)
        .fetch_one(&state.db)
        .await?;

    state.metrics.inc_authors_created();
    tracing::info!(author_id = id, user_id = user.id, "Author created");
    let author = Author { id, name, books: Vec::new() };
    Ok((StatusCode::CREATED, Json(Envelope::new("Author created successfully", author))))
}

async fn update_author(state: AppState, user_id: i64, raw_id: &str, body: Value, mode: Mode) -> AppResult<Json<Envelope<Author>>> {
    let id = parse_id(raw_id, "Author")?;
    let existing = AuthorRow::find(&state.db, id).await?.ok_or_not_found("Author")?;
    let input = AuthorInput::validate(&body, mode)?;

    let name = input.name.unwrap_or(existing.name);
    sqlx::query("UPDATE authors SET name = ?1 WHERE id = ?2")
        .bind(&name)
        .bind(id)
        .execute(&state.db)
        .await?;
    let author = Author::find(&state.db, id).await?.ok_or_not_found("Author")?;

    state.metrics.inc_authors_updated();
    tracing::info!(author_id = id, user_id, "Author updated");
    Ok(Json(Envelope::new("Author updated successfully", author)))
}

pub async fn replace_author(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody,
) -> AppResult<Json<Envelope<Author>>> {
    update_author(state, user.id, &id, body, Mode::Replace).await
}

pub async fn patch_author(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody,
) -> AppResult<Json<Envelope<Author>>> {
    update_author(state, user.id, &id, body, Mode::Partial).await
}

/// Books of the author go with it (`ON DELETE CASCADE`). Responds 200 with a
/// confirmation message rather than an empty 204.
pub async fn delete_author(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = parse_id(&id, "Author")?;
    let author = AuthorRow::find(&state.db, id).await?.ok_or_not_found("Author")?;
    let removed = sqlx::query("DELETE FROM authors WHERE id = ?1").bind(id).execute(&state.db).await?;

    state.metrics.inc_authors_deleted();
    tracing::info!(author_id = id, user_id = user.id, rows = removed.rows_affected(), "Author deleted");
    Ok(Json(json!({ "message": format!("Author \"{}\" deleted successfully", author.name) })))
}
