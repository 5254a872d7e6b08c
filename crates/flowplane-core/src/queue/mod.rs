//! Durable job queue port.
//!
//! Jobs are addressed by deterministic ids. Upserting a pending job replaces
//! it; upserting onto a running job is ignored so the running attempt keeps
//! ownership of its id. A claimed job is invisible to other claimers until it
//! is completed or rescheduled.

pub mod memory;

use chrono::{DateTime, Utc};
use flowplane_types::error::QueueError;
use flowplane_types::job::{JobData, JobEnvelope, JobId, JobRequest, UpsertOutcome};

pub use memory::InMemoryJobQueue;

/// Queue of lifecycle jobs.
pub trait JobQueue: Send + Sync {
    /// Insert a job or replace the pending job with the same id.
    fn upsert(
        &self,
        request: JobRequest,
    ) -> impl std::future::Future<Output = Result<UpsertOutcome, QueueError>> + Send;

    /// Claim the earliest due pending job, marking it running and counting the
    /// attempt.
    fn claim_next(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Option<JobEnvelope>, QueueError>> + Send;

    /// Persist updated job data (completed phases) of a running job.
    fn save_progress(
        &self,
        job_id: &JobId,
        data: &JobData,
    ) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;

    /// Remove a finished job.
    fn complete(
        &self,
        job_id: &JobId,
    ) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;

    /// Return a running job to pending, due at `run_at`.
    fn retry_later(
        &self,
        job_id: &JobId,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;

    fn get(
        &self,
        job_id: &JobId,
    ) -> impl std::future::Future<Output = Result<Option<JobEnvelope>, QueueError>> + Send;

    fn list(&self) -> impl std::future::Future<Output = Result<Vec<JobEnvelope>, QueueError>> + Send;

    /// Return jobs left running by a crashed process to pending. Returns how
    /// many were recovered.
    fn requeue_running(&self) -> impl std::future::Future<Output = Result<u64, QueueError>> + Send;
}
