//! Business services that orchestrate the repository ports.

pub mod flow;
