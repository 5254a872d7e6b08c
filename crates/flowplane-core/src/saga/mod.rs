//! Resumable lifecycle jobs.
//!
//! Each job type is an ordered list of phases. A phase's side effect runs at
//! most once per job: after it succeeds the phase is recorded in the job data
//! and persisted through the queue, and a redelivered job skips it.

pub mod handler;
pub mod worker;

use std::time::Duration;

use flowplane_types::config::PhaseRetryConfig;
use flowplane_types::error::{QueueError, RepositoryError};
use flowplane_types::job::{JobEnvelope, SagaPhase};

use crate::queue::JobQueue;
use crate::trigger::TriggerError;

pub use handler::FlowJobHandler;
pub use worker::JobWorker;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failure of a job attempt.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Worth retrying with backoff.
    #[error("{0}")]
    Transient(String),

    /// Retrying cannot help; compensate immediately.
    #[error("{0}")]
    Permanent(String),
}

impl JobError {
    pub fn is_transient(&self) -> bool {
        matches!(self, JobError::Transient(_))
    }
}

impl From<TriggerError> for JobError {
    fn from(err: TriggerError) -> Self {
        match &err {
            TriggerError::Engine(e) if !e.is_transient() => JobError::Permanent(err.to_string()),
            _ => JobError::Transient(err.to_string()),
        }
    }
}

impl From<RepositoryError> for JobError {
    fn from(err: RepositoryError) -> Self {
        JobError::Transient(err.to_string())
    }
}

impl From<QueueError> for JobError {
    fn from(err: QueueError) -> Self {
        JobError::Transient(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// JobHandler
// ---------------------------------------------------------------------------

/// Executes claimed jobs on behalf of a [`JobWorker`].
pub trait JobHandler: Send + Sync {
    /// Run the job's remaining phases. Progress is saved through `queue`
    /// after each phase so a retry resumes where this attempt stopped.
    fn handle<Q: JobQueue>(
        &self,
        job: &mut JobEnvelope,
        queue: &Q,
    ) -> impl std::future::Future<Output = Result<(), JobError>> + Send;

    /// Compensate a job that will not be retried again.
    fn on_exhausted(
        &self,
        job: &JobEnvelope,
        error: &JobError,
    ) -> impl std::future::Future<Output = ()> + Send;
}

// ---------------------------------------------------------------------------
// PhaseRetry
// ---------------------------------------------------------------------------

/// In-attempt retry policy for a single phase.
#[derive(Debug, Clone)]
pub struct PhaseRetry {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl PhaseRetry {
    pub fn from_config(config: &PhaseRetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    /// `attempt` is 1-based.
    pub fn should_retry(&self, attempt: u32, error: &JobError) -> bool {
        error.is_transient() && attempt < self.max_attempts
    }

    /// Delay after the given failed attempt: `base * 2^(attempt-1)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1).min(16))
    }

    /// Log helper shared by the handlers.
    pub(crate) fn log_retry(&self, phase: SagaPhase, attempt: u32, error: &JobError) {
        tracing::warn!(
            %phase,
            attempt,
            max_attempts = self.max_attempts,
            error = %error,
            "phase failed, retrying"
        );
    }
}

impl Default for PhaseRetry {
    fn default() -> Self {
        Self::from_config(&PhaseRetryConfig::default())
    }
}
