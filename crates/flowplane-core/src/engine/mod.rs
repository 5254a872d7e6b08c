//! Trigger engine gateway port.
//!
//! The engine knows how to talk to pieces: it resolves a version's trigger,
//! registers and unregisters webhooks, and runs single poll or test cycles.
//! The control plane never calls a piece directly.

pub mod box_engine;

use flowplane_types::error::EngineError;
use flowplane_types::flow::FlowVersion;
use flowplane_types::trigger::{
    PieceTriggerDefinition, PollRequest, PollingItem, TestTriggerOutcome, TriggerRegistration,
    TriggerSource,
};

pub use box_engine::BoxTriggerEngine;

/// Gateway to the engine that executes piece triggers.
///
/// Uses RPITIT; wrap in [`BoxTriggerEngine`] for dynamic dispatch.
pub trait TriggerEngine: Send + Sync {
    /// Resolve which piece trigger a version uses and how it delivers events.
    fn resolve_trigger(
        &self,
        version: &FlowVersion,
    ) -> impl std::future::Future<Output = Result<PieceTriggerDefinition, EngineError>> + Send;

    /// Register the version's trigger with its provider.
    fn register(
        &self,
        version: &FlowVersion,
        project_id: &str,
        simulate: bool,
    ) -> impl std::future::Future<Output = Result<TriggerRegistration, EngineError>> + Send;

    /// Remove a registration. Unregistering twice is not an error.
    fn unregister(
        &self,
        source: &TriggerSource,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;

    /// Run one poll cycle and return every candidate item.
    fn poll(
        &self,
        version: &FlowVersion,
        project_id: &str,
        request: PollRequest,
    ) -> impl std::future::Future<Output = Result<Vec<PollingItem>, EngineError>> + Send;

    /// Run the piece's test hook.
    fn test(
        &self,
        version: &FlowVersion,
        project_id: &str,
    ) -> impl std::future::Future<Output = Result<TestTriggerOutcome, EngineError>> + Send;
}
