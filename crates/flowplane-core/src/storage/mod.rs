//! Storage trait definitions.

pub mod flow_store;

pub use flow_store::FlowStore;
