//! Job worker loop.
//!
//! Claims due jobs, hands them to a [`JobHandler`] and settles the outcome
//! with the queue: completed jobs are removed, transient failures are
//! rescheduled with the job's backoff, and jobs that fail permanently or on
//! their final attempt are compensated and removed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use flowplane_types::error::QueueError;

use crate::queue::JobQueue;

use super::JobHandler;

pub struct JobWorker<Q: JobQueue, H: JobHandler> {
    queue: Arc<Q>,
    handler: Arc<H>,
    poll_interval: Duration,
}

impl<Q: JobQueue, H: JobHandler> JobWorker<Q, H> {
    pub fn new(queue: Arc<Q>, handler: Arc<H>, poll_interval: Duration) -> Self {
        Self {
            queue,
            handler,
            poll_interval,
        }
    }

    /// Process at most one job. Returns `false` when nothing was due.
    pub async fn run_once(&self) -> Result<bool, QueueError> {
        let Some(mut job) = self.queue.claim_next(Utc::now()).await? else {
            return Ok(false);
        };

        tracing::debug!(
            job_id = %job.job_id,
            kind = job.data.kind(),
            attempt = job.attempts_made,
            "job claimed"
        );

        match self.handler.handle(&mut job, &*self.queue).await {
            Ok(()) => {
                self.queue.complete(&job.job_id).await?;
                tracing::info!(job_id = %job.job_id, "job completed");
            }
            Err(e) if !e.is_transient() || job.is_final_attempt() => {
                tracing::warn!(
                    job_id = %job.job_id,
                    attempts = job.attempts_made,
                    error = %e,
                    "job failed terminally"
                );
                self.handler.on_exhausted(&job, &e).await;
                self.queue.complete(&job.job_id).await?;
            }
            Err(e) => {
                let delay_ms = job.backoff.delay_ms(job.attempts_made);
                let run_at = Utc::now() + chrono::Duration::milliseconds(delay_ms as i64);
                self.queue.retry_later(&job.job_id, run_at, &e.to_string()).await?;
                tracing::warn!(
                    job_id = %job.job_id,
                    attempt = job.attempts_made,
                    max_attempts = job.max_attempts,
                    retry_in_ms = delay_ms,
                    error = %e,
                    "job failed, rescheduled"
                );
            }
        }
        Ok(true)
    }

    /// Drain due jobs, then sleep for the poll interval, until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "job queue error"),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::debug!("job worker stopped");
    }
}

impl<Q, H> JobWorker<Q, H>
where
    Q: JobQueue + 'static,
    H: JobHandler + 'static,
{
    /// Spawn `count` concurrent loops over the same queue.
    pub fn spawn(self: &Arc<Self>, count: usize, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        (0..count.max(1))
            .map(|_| {
                let worker = Arc::clone(self);
                let cancel = cancel.clone();
                tokio::spawn(async move { worker.run(cancel).await })
            })
            .collect()
    }
}
