//! HTTP route handlers grouped by resource.
//!
//! Handlers are thin wrappers over [`crate::scan::ScanService`] and
//! [`crate::cache::MessageCache`], annotated with `#[openapi]` so
//! `rocket_okapi` can derive an OpenAPI document automatically.

pub mod cache;
pub mod health;
pub mod report;
pub mod scan;
