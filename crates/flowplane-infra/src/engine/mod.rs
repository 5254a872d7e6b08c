//! Trigger engine gateway implementations.

pub mod http;

pub use http::HttpTriggerEngine;
