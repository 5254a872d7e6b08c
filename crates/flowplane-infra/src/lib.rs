//! Infrastructure layer for Flowplane.
//!
//! Contains implementations of the ports defined in `flowplane-core`:
//! SQLite repositories, flow store and durable job queue, the HTTP trigger
//! engine client, and the configuration loader.

pub mod config;
pub mod engine;
pub mod sqlite;
