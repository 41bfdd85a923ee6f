//! Router-level and component tests.
//!
//! - **support**: temporary database, cheap password hashing, request helpers
//! - **books_api_tests** / **authors_api_tests**: catalog endpoints
//! - **auth_api_tests**: tokens, registration, sessions, rate limiting
//! - **health_api_tests**: operational endpoints and response headers
//! - **config_tests**, **db_tests**, **error_tests**

pub mod support;

pub mod authors_api_tests;
pub mod db_tests;
pub mod error_tests;
pub mod health_api_tests;
