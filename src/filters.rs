//! Query-parameter filters for the book and author lists.
//!
//! A filter is parsed from the raw query map into a typed struct
//! ([`BookFilter`], [`AuthorFilter`]) and compiled into a [`Predicate`] tree.
//! The same predicate can be evaluated against in-memory records through
//! [`Filterable`] or rendered into a `sqlx::QueryBuilder` as a parameterized
//! `WHERE` fragment.
//!
//! Rules shared by both filters:
//! - all supplied filters are ANDed together
//! - empty values are treated as absent
//! - unknown parameters are ignored
//! - numeric parameters that do not parse are reported per parameter

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite};
use thiserror::Error;

use crate::error::{AppError, FieldErrors};

const LIKE_ESCAPE: char = '!';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Enter a number.")]
    InvalidNumber { param: String, value: String },
}

impl FilterError {
    pub fn param(&self) -> &str {
        match self {
            FilterError::InvalidNumber { param, .. } => param,
        }
    }
}

impl From<Vec<FilterError>> for AppError {
    fn from(errors: Vec<FilterError>) -> Self {
        let mut fields = FieldErrors::new();
        for err in &errors {
            fields.add(err.param(), err.to_string());
        }
        AppError::Validation(fields)
    }
}

/// A field value as seen by the predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Int(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Substring match, case-insensitive for ASCII letters.
    IContains,
    Exact,
    Gte,
    Lte,
}

/// How a filterable field is reached from the row being filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSql {
    /// A single-valued SQL expression (a column or a scalar subquery).
    Scalar(&'static str),
    /// A multi-valued relation; the comparison holds if any related row
    /// matches. `from` is the correlated `FROM ... WHERE ...` part and
    /// `column` the compared column inside it.
    Related { from: &'static str, column: &'static str },
}

pub trait FilterField: Copy {
    fn sql(self) -> FieldSql;
}

/// Records that can be matched against a `Predicate<F>` in memory.
pub trait Filterable<F: FilterField> {
    /// Every value the record holds for `field`; multi-valued relations return
    /// one entry per related row.
    fn values(&self, field: F) -> Vec<Value>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate<F> {
    All(Vec<Predicate<F>>),
    Any(Vec<Predicate<F>>),
    Compare { field: F, lookup: Lookup, value: Value },
}

impl<F: FilterField> Predicate<F> {
    pub fn compare(field: F, lookup: Lookup, value: Value) -> Self {
        Predicate::Compare { field, lookup, value }
    }

    pub fn icontains(field: F, needle: &str) -> Self {
        Self::compare(field, Lookup::IContains, Value::Text(needle.to_string()))
    }

    pub fn matches<R: Filterable<F>>(&self, record: &R) -> bool {
        match self {
            Predicate::All(parts) => parts.iter().all(|p| p.matches(record)),
            Predicate::Any(parts) => parts.iter().any(|p| p.matches(record)),
            Predicate::Compare { field, lookup, value } => {
                record.values(*field).iter().any(|candidate| compare_values(candidate, *lookup, value))
            }
        }
    }

    /// Appends the predicate as a parenthesized SQL condition.
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Predicate::All(parts) => push_joined(qb, parts, " AND ", "1=1"),
            Predicate::Any(parts) => push_joined(qb, parts, " OR ", "1=0"),
            Predicate::Compare { field, lookup, value } => match field.sql() {
                FieldSql::Scalar(expr) => push_comparison(qb, expr, *lookup, value),
                FieldSql::Related { from, column } => {
                    qb.push("EXISTS (SELECT 1 ").push(from).push(" AND ");
                    push_comparison(qb, column, *lookup, value);
                    qb.push(")");
                }
            },
        }
    }
}

fn push_joined<F: FilterField>(
    qb: &mut QueryBuilder<'_, Sqlite>,
    parts: &[Predicate<F>],
    separator: &str,
    empty: &str,
) {
    if parts.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            qb.push(separator);
        }
        part.push_sql(qb);
    }
    qb.push(")");
}

fn push_comparison(qb: &mut QueryBuilder<'_, Sqlite>, expr: &str, lookup: Lookup, value: &Value) {
    match (lookup, value) {
        (Lookup::IContains, value) => {
            // SQLite's LOWER folds ASCII only; fold the needle the same way
            let needle = match value {
                Value::Text(s) => s.to_ascii_lowercase(),
                Value::Int(n) => n.to_string(),
            };
            qb.push("LOWER(")
                .push(expr)
                .push(") LIKE ")
                .push_bind(format!("%{}%", escape_like_pattern(&needle)))
                .push(" ESCAPE '!'");
        }
        (op, Value::Text(s)) => {
            qb.push(expr).push(sql_operator(op)).push_bind(s.clone());
        }
        (op, Value::Int(n)) => {
            qb.push(expr).push(sql_operator(op)).push_bind(*n);
        }
    }
}

fn sql_operator(lookup: Lookup) -> &'static str {
    match lookup {
        Lookup::Exact | Lookup::IContains => " = ",
        Lookup::Gte => " >= ",
        Lookup::Lte => " <= ",
    }
}

fn compare_values(candidate: &Value, lookup: Lookup, wanted: &Value) -> bool {
    match (lookup, candidate, wanted) {
        (Lookup::IContains, Value::Text(have), Value::Text(needle)) => {
            have.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
        }
        (Lookup::IContains, Value::Int(have), Value::Int(needle)) => {
            have.to_string().contains(&needle.to_string())
        }
        (Lookup::Exact, have, needle) => have == needle,
        (Lookup::Gte, Value::Int(have), Value::Int(bound)) => have >= bound,
        (Lookup::Lte, Value::Int(have), Value::Int(bound)) => have <= bound,
        (Lookup::Gte, Value::Text(have), Value::Text(bound)) => have >= bound,
        (Lookup::Lte, Value::Text(have), Value::Text(bound)) => have <= bound,
        _ => false,
    }
}

pub fn escape_like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            out.push(LIKE_ESCAPE);
        }
        out.push(ch);
    }
    out
}

/// Reads query parameters, collecting number errors instead of stopping at
/// the first one.
struct Params<'a> {
    raw: &'a HashMap<String, String>,
    errors: Vec<FilterError>,
}

impl<'a> Params<'a> {
    fn new(raw: &'a HashMap<String, String>) -> Self {
        Self { raw, errors: Vec::new() }
    }

    fn text(&self, name: &str) -> Option<String> {
        self.raw.get(name).filter(|v| !v.trim().is_empty()).cloned()
    }

    fn number(&mut self, name: &str) -> Option<i64> {
        let raw = self.text(name)?;
        match raw.trim().parse::<i64>() {
            Ok(n) => Some(n),
            Err(_) => {
                self.errors.push(FilterError::InvalidNumber { param: name.to_string(), value: raw });
                None
            }
        }
    }

    fn finish(self) -> Result<(), Vec<FilterError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookField {
    Title,
    AuthorName,
    AuthorId,
    PublicationYear,
}

impl FilterField for BookField {
    fn sql(self) -> FieldSql {
        match self {
            BookField::Title => FieldSql::Scalar("b.title"),
            BookField::AuthorName => FieldSql::Scalar("a.name"),
            BookField::AuthorId => FieldSql::Scalar("b.author_id"),
            BookField::PublicationYear => FieldSql::Scalar("b.publication_year"),
        }
    }
}

/// The `author` parameter: a numeric value selects by primary key, anything
/// else is a name substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorRef {
    Id(i64),
    Name(String),
}

impl AuthorRef {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(id) => AuthorRef::Id(id),
            Err(_) => AuthorRef::Name(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    pub title: Option<String>,
    pub title_exact: Option<String>,
    pub author_name: Option<String>,
    pub author_id: Option<i64>,
    pub author: Option<AuthorRef>,
    pub publication_year: Option<i64>,
    pub publication_year_min: Option<i64>,
    pub publication_year_max: Option<i64>,
    pub publication_year_range_min: Option<i64>,
    pub publication_year_range_max: Option<i64>,
    pub search: Option<String>,
}

impl BookFilter {
    pub fn from_params(raw: &HashMap<String, String>) -> Result<Self, Vec<FilterError>> {
        let mut p = Params::new(raw);
        let filter = BookFilter {
            title: p.text("title"),
            title_exact: p.text("title_exact"),
            author_name: p.text("author_name"),
            author_id: p.number("author_id"),
            author: p.text("author").map(|v| AuthorRef::parse(&v)),
            publication_year: p.number("publication_year"),
            publication_year_min: p.number("publication_year_min"),
            publication_year_max: p.number("publication_year_max"),
            publication_year_range_min: p.number("publication_year_range_min"),
            publication_year_range_max: p.number("publication_year_range_max"),
            search: p.text("search"),
        };
        p.finish()?;
        Ok(filter)
    }

    pub fn predicate(&self) -> Predicate<BookField> {
        use BookField::*;

        let mut parts = Vec::new();
        if let Some(v) = &self.title {
            parts.push(Predicate::icontains(Title, v));
        }
        if let Some(v) = &self.title_exact {
            parts.push(Predicate::compare(Title, Lookup::Exact, Value::Text(v.clone())));
        }
        if let Some(v) = &self.author_name {
            parts.push(Predicate::icontains(AuthorName, v));
        }
        if let Some(id) = self.author_id {
            parts.push(Predicate::compare(AuthorId, Lookup::Exact, Value::Int(id)));
        }
        match &self.author {
            Some(AuthorRef::Id(id)) => parts.push(Predicate::compare(AuthorId, Lookup::Exact, Value::Int(*id))),
            Some(AuthorRef::Name(name)) => parts.push(Predicate::icontains(AuthorName, name)),
            None => {}
        }
        if let Some(year) = self.publication_year {
            parts.push(Predicate::compare(PublicationYear, Lookup::Exact, Value::Int(year)));
        }
        for (bound, lookup) in [
            (self.publication_year_min, Lookup::Gte),
            (self.publication_year_max, Lookup::Lte),
            (self.publication_year_range_min, Lookup::Gte),
            (self.publication_year_range_max, Lookup::Lte),
        ] {
            if let Some(year) = bound {
                parts.push(Predicate::compare(PublicationYear, lookup, Value::Int(year)));
            }
        }
        if let Some(term) = &self.search {
            parts.push(Predicate::Any(vec![
                Predicate::icontains(Title, term),
                Predicate::icontains(AuthorName, term),
            ]));
        }
        Predicate::All(parts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorField {
    Name,
    /// Number of related books.
    BookCount,
    /// Titles of related books.
    BookTitle,
}

impl FilterField for AuthorField {
    fn sql(self) -> FieldSql {
        match self {
            AuthorField::Name => FieldSql::Scalar("a.name"),
            AuthorField::BookCount => {
                FieldSql::Scalar("(SELECT COUNT(*) FROM books cb WHERE cb.author_id = a.id)")
            }
            AuthorField::BookTitle => FieldSql::Related {
                from: "FROM books rb WHERE rb.author_id = a.id",
                column: "rb.title",
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorFilter {
    pub name: Option<String>,
    pub name_exact: Option<String>,
    pub book_count_min: Option<i64>,
    pub book_count_max: Option<i64>,
    pub search: Option<String>,
}

impl AuthorFilter {
    pub fn from_params(raw: &HashMap<String, String>) -> Result<Self, Vec<FilterError>> {
        let mut p = Params::new(raw);
        let filter = AuthorFilter {
            name: p.text("name"),
            name_exact: p.text("name_exact"),
            book_count_min: p.number("book_count_min"),
            book_count_max: p.number("book_count_max"),
            search: p.text("search"),
        };
        p.finish()?;
        Ok(filter)
    }

    pub fn predicate(&self) -> Predicate<AuthorField> {
        use AuthorField::*;

        let mut parts = Vec::new();
        if let Some(v) = &self.name {
            parts.push(Predicate::icontains(Name, v));
        }
        if let Some(v) = &self.name_exact {
            parts.push(Predicate::compare(Name, Lookup::Exact, Value::Text(v.clone())));
        }
        if let Some(n) = self.book_count_min {
            parts.push(Predicate::compare(BookCount, Lookup::Gte, Value::Int(n)));
        }
        if let Some(n) = self.book_count_max {
            parts.push(Predicate::compare(BookCount, Lookup::Lte, Value::Int(n)));
        }
        // EXISTS keeps each author once no matter how many titles match
        if let Some(term) = &self.search {
            parts.push(Predicate::Any(vec![Predicate::icontains(Name, term), Predicate::icontains(BookTitle, term)]));
        }
        Predicate::All(parts)
    }
}
