//! Ordering and page-number pagination for list endpoints.

use std::collections::HashMap;

use axum::http::Uri;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};

use crate::config::PaginationConfig;
use crate::error::{AppError, AppResult};

/// Orderable fields of a resource: public name and SQL expression.
pub type OrderFields = &'static [(&'static str, &'static str)];

pub const BOOK_ORDER_FIELDS: OrderFields = &[
    ("id", "b.id"),
    ("title", "b.title"),
    ("publication_year", "b.publication_year"),
    ("author__name", "a.name"),
];

pub const AUTHOR_ORDER_FIELDS: OrderFields = &[("id", "a.id"), ("name", "a.name")];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub expr: &'static str,
    pub descending: bool,
}

/// Parsed `ordering=` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    pub terms: Vec<OrderTerm>,
}

impl Ordering {
    /// Parses a comma separated list such as `-publication_year,title`.
    ///
    /// Unknown fields are skipped; if nothing usable remains `default` is
    /// used instead.
    pub fn parse(raw: Option<&str>, fields: OrderFields, default: &str) -> Self {
        let terms = raw.map(|r| Self::terms(r, fields)).unwrap_or_default();
        if terms.is_empty() {
            return Ordering { terms: Self::terms(default, fields) };
        }
        Ordering { terms }
    }

    fn terms(raw: &str, fields: OrderFields) -> Vec<OrderTerm> {
        raw.split(',')
            .filter_map(|part| {
                let part = part.trim();
                let (name, descending) = match part.strip_prefix('-') {
                    Some(rest) => (rest, true),
                    None => (part, false),
                };
                fields
                    .iter()
                    .find(|(field, _)| *field == name)
                    .map(|&(_, expr)| OrderTerm { expr, descending })
            })
            .collect()
    }

    /// Appends `ORDER BY ...` with `tiebreak` as the last key so pages are
    /// stable.
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Sqlite>, tiebreak: &'static str) {
        qb.push(" ORDER BY ");
        for term in &self.terms {
            qb.push(term.expr).push(if term.descending { " DESC, " } else { " ASC, " });
        }
        qb.push(tiebreak).push(" ASC");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageNumber {
    Number(u32),
    /// `page=last`
    Last,
}

/// Requested page, validated against the configured limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: PageNumber,
    pub page_size: u32,
}

impl PageRequest {
    /// `page` must be a positive integer; `page_size` falls back to the
    /// default when it does not parse and is capped at the maximum.
    pub fn from_params(params: &HashMap<String, String>, cfg: &PaginationConfig) -> AppResult<Self> {
        let page = match params.get("page").map(|p| p.trim()) {
            None | Some("") => PageNumber::Number(1),
            Some("last") => PageNumber::Last,
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n >= 1 => PageNumber::Number(n),
                _ => return Err(AppError::NotFound("Invalid page.".to_string())),
            },
        };
        let page_size = params
            .get("page_size")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .map(|n| n.min(cfg.max_page_size))
            .unwrap_or(cfg.page_size);
        Ok(PageRequest { page, page_size })
    }

    /// Resolves the page against the total row count. `last` resolves to the
    /// final page; a page past the end is an error. An empty result still has
    /// one (empty) page.
    pub fn resolve(self, count: i64) -> AppResult<ResolvedPage> {
        let size = i64::from(self.page_size);
        let num_pages = ((count + size - 1) / size).max(1);
        let page = match self.page {
            PageNumber::Number(n) => i64::from(n),
            PageNumber::Last => num_pages,
        };
        if page > num_pages {
            return Err(AppError::NotFound("Invalid page.".to_string()));
        }
        Ok(ResolvedPage { page, num_pages, limit: size, offset: (page - 1) * size })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPage {
    pub page: i64,
    pub num_pages: i64,
    pub limit: i64,
    pub offset: i64,
}

impl ResolvedPage {
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" LIMIT ").push_bind(self.limit).push(" OFFSET ").push_bind(self.offset);
    }
}

/// The list envelope: `{count, next, previous, results}`.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: i64, page: &ResolvedPage, uri: &Uri) -> Self {
        let next = (page.page < page.num_pages).then(|| page_link(uri, Some(page.page + 1)));
        // Page 1 is linked without the parameter
        let previous = (page.page > 1).then(|| {
            let target = page.page - 1;
            page_link(uri, (target > 1).then_some(target))
        });
        Page { count, next, previous, results }
    }
}

/// The request URI with `page` replaced (or removed) and every other
/// parameter kept in its original order.
pub fn page_link(uri: &Uri, page: Option<i64>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    let query = uri.query().unwrap_or("");
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if key != "page" {
            serializer.append_pair(&key, &value);
        }
    }
    if let Some(page) = page {
        serializer.append_pair("page", &page.to_string());
    }
    let encoded = serializer.finish();
    if encoded.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), encoded)
    }
}
