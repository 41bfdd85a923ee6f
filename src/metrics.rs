use serde::Serialize;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide counters exposed by `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    pub books_created: Arc<AtomicU64>,
    pub books_updated: Arc<AtomicU64>,
    pub books_deleted: Arc<AtomicU64>,
    pub authors_created: Arc<AtomicU64>,
    pub authors_updated: Arc<AtomicU64>,
    pub authors_deleted: Arc<AtomicU64>,
    pub users_registered: Arc<AtomicU64>,
    pub tokens_issued: Arc<AtomicU64>,
    pub logins: Arc<AtomicU64>,
    pub auth_failures: Arc<AtomicU64>,
    pub start_time: Instant,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            books_created: Arc::default(),
            books_updated: Arc::default(),
            books_deleted: Arc::default(),
            authors_created: Arc::default(),
            authors_updated: Arc::default(),
            authors_deleted: Arc::default(),
            users_registered: Arc::default(),
            tokens_issued: Arc::default(),
            logins: Arc::default(),
            auth_failures: Arc::default(),
            start_time: Instant::now(),
        }
    }

    pub fn inc_books_created(&self) {
        bump(&self.books_created);
    }

    pub fn inc_books_updated(&self) {
        bump(&self.books_updated);
    }

    pub fn inc_books_deleted(&self) {
        bump(&self.books_deleted);
    }

    pub fn inc_authors_created(&self) {
        bump(&self.authors_created);
    }

    pub fn inc_authors_updated(&self) {
        bump(&self.authors_updated);
    }

    pub fn inc_authors_deleted(&self) {
        bump(&self.authors_deleted);
    }

    pub fn inc_users_registered(&self) {
        bump(&self.users_registered);
    }

    pub fn inc_tokens_issued(&self) {
        bump(&self.tokens_issued);
    }

    pub fn inc_logins(&self) {
        bump(&self.logins);
    }

    pub fn inc_auth_failures(&self) {
        bump(&self.auth_failures);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            books_created: load(&self.books_created),
            books_updated: load(&self.books_updated),
            books_deleted: load(&self.books_deleted),
            authors_created: load(&self.authors_created),
            authors_updated: load(&self.authors_updated),
            authors_deleted: load(&self.authors_deleted),
            users_registered: load(&self.users_registered),
            tokens_issued: load(&self.tokens_issued),
            logins: load(&self.logins),
            auth_failures: load(&self.auth_failures),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub books_created: u64,
    pub books_updated: u64,
    pub books_deleted: u64,
    pub authors_created: u64,
    pub authors_updated: u64,
    pub authors_deleted: u64,
    pub users_registered: u64,
    pub tokens_issued: u64,
    pub logins: u64,
    pub auth_failures: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let counters = [
            ("bookshelf_books_created_total", "Books created", self.books_created),
            ("bookshelf_books_updated_total", "Books updated", self.books_updated),
            ("bookshelf_books_deleted_total", "Books deleted", self.books_deleted),
            ("bookshelf_authors_created_total", "Authors created", self.authors_created),
            ("bookshelf_authors_updated_total", "Authors updated", self.authors_updated),
            ("bookshelf_authors_deleted_total", "Authors deleted", self.authors_deleted),
            ("bookshelf_users_registered_total", "Accounts registered", self.users_registered),
            ("bookshelf_tokens_issued_total", "API tokens issued", self.tokens_issued),
            ("bookshelf_logins_total", "Session logins", self.logins),
            ("bookshelf_auth_failures_total", "Rejected credentials", self.auth_failures),
        ];
        let mut out = String::new();
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {} {}\n# TYPE {} counter\n{} {}", name, help, name, name, value);
        }
        let _ = writeln!(
            out,
            "# HELP bookshelf_uptime_seconds Seconds since start\n# TYPE bookshelf_uptime_seconds gauge\nbookshelf_uptime_seconds {}",
            self.uptime_seconds
        );
        out
    }
}
