//! Row types for the catalog and the accounts tables, plus the queries that
//! load them.

use std::collections::HashMap;

use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::filters::{AuthorField, BookField, Filterable, Value};

/// A book joined with its author's name.
///
/// `author_name` is carried for filtering and ordering only; the wire
/// representation exposes the author by primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub publication_year: i64,
    #[serde(rename = "author")]
    pub author_id: i64,
    #[serde(skip)]
    pub author_name: String,
}

pub const BOOK_SELECT: &str = "SELECT b.id, b.title, b.publication_year, b.author_id, a.name AS author_name \
     FROM books b JOIN authors a ON a.id = b.author_id";

impl Book {
    pub async fn find(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Book>> {
        sqlx::query_as::<_, Book>(&format!("{} WHERE b.id = ?1", BOOK_SELECT))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Books of the given authors, ordered by title like the book list.
    pub async fn for_authors(pool: &SqlitePool, author_ids: &[i64]) -> sqlx::Result<Vec<Book>> {
        if author_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(BOOK_SELECT);
        qb.push(" WHERE b.author_id IN (");
        let mut sep = qb.separated(", ");
        for id in author_ids {
            sep.push_bind(*id);
        }
        sep.push_unseparated(") ORDER BY b.title ASC, b.id ASC");
        qb.build_query_as::<Book>().fetch_all(pool).await
    }
}

impl Filterable<BookField> for Book {
    fn values(&self, field: BookField) -> Vec<Value> {
        match field {
            BookField::Title => vec![Value::Text(self.title.clone())],
            BookField::AuthorName => vec![Value::Text(self.author_name.clone())],
            BookField::AuthorId => vec![Value::Int(self.author_id)],
            BookField::PublicationYear => vec![Value::Int(self.publication_year)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AuthorRow {
    pub id: i64,
    pub name: String,
}

impl AuthorRow {
    pub async fn find(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<AuthorRow>> {
        sqlx::query_as::<_, AuthorRow>("SELECT id, name FROM authors WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn exists(pool: &SqlitePool, id: i64) -> sqlx::Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM authors WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(found.is_some())
    }
}

/// An author with the nested list of their books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub books: Vec<Book>,
}

impl Author {
    /// Attaches books to author rows with one extra query, keeping row order.
    pub async fn with_books(pool: &SqlitePool, rows: Vec<AuthorRow>) -> sqlx::Result<Vec<Author>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut by_author: HashMap<i64, Vec<Book>> = HashMap::new();
        for book in Book::for_authors(pool, &ids).await? {
            by_author.entry(book.author_id).or_default().push(book);
        }
        Ok(rows
            .into_iter()
            .map(|row| Author {
                books: by_author.remove(&row.id).unwrap_or_default(),
                id: row.id,
                name: row.name,
            })
            .collect())
    }

    pub async fn find(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Author>> {
        let Some(row) = AuthorRow::find(pool, id).await? else {
            return Ok(None);
        };
        Ok(Self::with_books(pool, vec![row]).await?.into_iter().next())
    }
}

impl Filterable<AuthorField> for Author {
    fn values(&self, field: AuthorField) -> Vec<Value> {
        match field {
            AuthorField::Name => vec![Value::Text(self.name.clone())],
            AuthorField::BookCount => vec![Value::Int(self.books.len() as i64)],
            AuthorField::BookTitle => self.books.iter().map(|b| Value::Text(b.title.clone())).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub is_staff: bool,
    pub date_joined: String,
}

pub const USER_COLUMNS: &str = "id, username, email, password_hash, is_staff, date_joined";

impl User {
    pub async fn find_by_username(pool: &SqlitePool, username: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS))
            .bind(username)
            .fetch_optional(pool)
            .await
    }
}
