//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (flowplane-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod flow;
pub mod trigger_source;
