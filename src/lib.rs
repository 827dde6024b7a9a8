#![deny(missing_docs)]

//! Core library for the docquery HTTP gateway.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Bounded admission for pipeline calls.
pub mod limiter;
/// Structured logging and tracing setup.
pub mod logging;
/// External query and indexing pipelines.
pub mod pipeline;
/// Query adaptation, execution, and sanitizing.
pub mod query;
/// Upload staging for the indexing pipeline.
pub mod upload;
