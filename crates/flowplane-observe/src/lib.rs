//! Logging and trace export setup for the Flowplane binaries.

pub mod tracing_setup;
