//! Business logic and port definitions for Flowplane.
//!
//! This crate defines the "ports" (repository, queue, cache, lock and engine
//! traits) that the infrastructure layer implements. It depends only on
//! `flowplane-types` -- never on `flowplane-infra` or any database/IO crate.

pub mod cache;
pub mod engine;
pub mod event;
pub mod lock;
pub mod queue;
pub mod repository;
pub mod saga;
pub mod service;
pub mod storage;
pub mod trigger;

#[cfg(test)]
mod testing;
