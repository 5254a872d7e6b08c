//! BoxTriggerEngine -- object-safe dynamic dispatch wrapper for TriggerEngine.
//!
//! 1. Define an object-safe `TriggerEngineDyn` trait with boxed futures
//! 2. Blanket-impl `TriggerEngineDyn` for all `T: TriggerEngine`
//! 3. `BoxTriggerEngine` wraps `Box<dyn TriggerEngineDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use flowplane_types::error::EngineError;
use flowplane_types::flow::FlowVersion;
use flowplane_types::trigger::{
    PieceTriggerDefinition, PollRequest, PollingItem, TestTriggerOutcome, TriggerRegistration,
    TriggerSource,
};

use super::TriggerEngine;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

/// Object-safe version of [`TriggerEngine`] with boxed futures.
pub trait TriggerEngineDyn: Send + Sync {
    fn resolve_trigger_boxed<'a>(
        &'a self,
        version: &'a FlowVersion,
    ) -> BoxFuture<'a, PieceTriggerDefinition>;

    fn register_boxed<'a>(
        &'a self,
        version: &'a FlowVersion,
        project_id: &'a str,
        simulate: bool,
    ) -> BoxFuture<'a, TriggerRegistration>;

    fn unregister_boxed<'a>(&'a self, source: &'a TriggerSource) -> BoxFuture<'a, ()>;

    fn poll_boxed<'a>(
        &'a self,
        version: &'a FlowVersion,
        project_id: &'a str,
        request: PollRequest,
    ) -> BoxFuture<'a, Vec<PollingItem>>;

    fn test_boxed<'a>(
        &'a self,
        version: &'a FlowVersion,
        project_id: &'a str,
    ) -> BoxFuture<'a, TestTriggerOutcome>;
}

impl<T: TriggerEngine> TriggerEngineDyn for T {
    fn resolve_trigger_boxed<'a>(
        &'a self,
        version: &'a FlowVersion,
    ) -> BoxFuture<'a, PieceTriggerDefinition> {
        Box::pin(self.resolve_trigger(version))
    }

    fn register_boxed<'a>(
        &'a self,
        version: &'a FlowVersion,
        project_id: &'a str,
        simulate: bool,
    ) -> BoxFuture<'a, TriggerRegistration> {
        Box::pin(self.register(version, project_id, simulate))
    }

    fn unregister_boxed<'a>(&'a self, source: &'a TriggerSource) -> BoxFuture<'a, ()> {
        Box::pin(self.unregister(source))
    }

    fn poll_boxed<'a>(
        &'a self,
        version: &'a FlowVersion,
        project_id: &'a str,
        request: PollRequest,
    ) -> BoxFuture<'a, Vec<PollingItem>> {
        Box::pin(self.poll(version, project_id, request))
    }

    fn test_boxed<'a>(
        &'a self,
        version: &'a FlowVersion,
        project_id: &'a str,
    ) -> BoxFuture<'a, TestTriggerOutcome> {
        Box::pin(self.test(version, project_id))
    }
}

/// Type-erased trigger engine.
///
/// Lets the API pick the HTTP gateway at runtime and tests swap in a fake
/// without threading another generic parameter through every service.
pub struct BoxTriggerEngine {
    inner: Box<dyn TriggerEngineDyn + Send + Sync>,
}

impl BoxTriggerEngine {
    pub fn new<T: TriggerEngine + 'static>(engine: T) -> Self {
        Self {
            inner: Box::new(engine),
        }
    }

    pub async fn resolve_trigger(
        &self,
        version: &FlowVersion,
    ) -> Result<PieceTriggerDefinition, EngineError> {
        self.inner.resolve_trigger_boxed(version).await
    }

    pub async fn register(
        &self,
        version: &FlowVersion,
        project_id: &str,
        simulate: bool,
    ) -> Result<TriggerRegistration, EngineError> {
        self.inner.register_boxed(version, project_id, simulate).await
    }

    pub async fn unregister(&self, source: &TriggerSource) -> Result<(), EngineError> {
        self.inner.unregister_boxed(source).await
    }

    pub async fn poll(
        &self,
        version: &FlowVersion,
        project_id: &str,
        request: PollRequest,
    ) -> Result<Vec<PollingItem>, EngineError> {
        self.inner.poll_boxed(version, project_id, request).await
    }

    pub async fn test(
        &self,
        version: &FlowVersion,
        project_id: &str,
    ) -> Result<TestTriggerOutcome, EngineError> {
        self.inner.test_boxed(version, project_id).await
    }
}

impl std::fmt::Debug for BoxTriggerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxTriggerEngine").finish_non_exhaustive()
    }
}
