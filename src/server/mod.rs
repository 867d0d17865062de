//! HTTP server exposing the access layer.
//!
//! - [`api`]: axum router, handlers and error mapping

pub mod api;
