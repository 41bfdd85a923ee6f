//! Request middleware: caller identification, credential-endpoint rate
//! limiting, client IP extraction and response hardening headers.

pub mod auth;
pub mod ip;
pub mod rate_limit;
pub mod security_headers;

pub use rate_limit::EndpointRateLimiter;
