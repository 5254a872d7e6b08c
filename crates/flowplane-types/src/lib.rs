//! Shared domain types for Flowplane.
//!
//! Flows and their versions, trigger registrations, background job payloads,
//! events, configuration and the error enums used across the workspace.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod flow;
pub mod job;
pub mod trigger;
