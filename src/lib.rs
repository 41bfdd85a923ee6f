//! # Bookshelf
//!
//! REST backend for a small library catalog: authors, their books, and the
//! accounts allowed to edit them.
//!
//! - [`filters`]: query-parameter filters compiled to predicates that run
//!   both in SQL and in memory
//! - [`query`]: ordering and page-number pagination
//! - [`serializers`]: request body validation
//! - [`auth`]: password hashing, API tokens, sessions, user extractors
//! - [`routes`] and [`app`]: HTTP handlers and router assembly
//! - [`config`], [`db`], [`error`], [`metrics`], [`middleware`], [`state`]

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod query;
pub mod routes;
pub mod serializers;
pub mod state;

#[cfg(test)]
mod tests;
