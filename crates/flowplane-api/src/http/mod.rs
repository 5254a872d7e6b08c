//! HTTP/REST API layer for Flowplane.
//!
//! Axum-based REST API at `/api/v1/` with an envelope response format, a
//! per-project server-sent-events stream and CORS support.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
