//! Trigger registrations: activation, polling and test sessions.

pub mod manager;
pub mod polling;
pub mod scheduler;
pub mod test_trigger;

use flowplane_types::error::{EngineError, FlowError, RepositoryError};

pub use manager::TriggerSourceManager;
pub use polling::{PollingService, TimeBasedStrategy};
pub use scheduler::PollingScheduler;
pub use test_trigger::TestTriggerService;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from trigger registration operations.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl From<TriggerError> for FlowError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::Engine(e) => e.into(),
            TriggerError::Storage(e) => e.into(),
        }
    }
}
