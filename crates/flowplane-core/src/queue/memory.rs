//! In-memory job queue.
//!
//! Single-process only and not persistent; suitable for tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use flowplane_types::error::QueueError;
use flowplane_types::job::{JobData, JobEnvelope, JobId, JobRequest, JobState, UpsertOutcome};

use super::JobQueue;

fn poison_err<T>(_: PoisonError<T>) -> QueueError {
    QueueError::Storage("job queue lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    jobs: RwLock<HashMap<JobId, JobEnvelope>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_running<T>(
        &self,
        job_id: &JobId,
        f: impl FnOnce(&mut JobEnvelope) -> T,
    ) -> Result<T, QueueError> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))?;
        Ok(f(job))
    }
}

impl JobQueue for InMemoryJobQueue {
    async fn upsert(&self, request: JobRequest) -> Result<UpsertOutcome, QueueError> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        let outcome = match jobs.get(&request.job_id) {
            Some(existing) if existing.state == JobState::Running => {
                return Ok(UpsertOutcome::IgnoredRunning);
            }
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };
        let envelope = JobEnvelope::from_request(request);
        jobs.insert(envelope.job_id.clone(), envelope);
        Ok(outcome)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<JobEnvelope>, QueueError> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        let next = jobs
            .values_mut()
            .filter(|job| job.state == JobState::Pending && job.run_at <= now)
            .min_by(|a, b| a.run_at.cmp(&b.run_at).then_with(|| a.job_id.cmp(&b.job_id)));

        Ok(next.map(|job| {
            job.state = JobState::Running;
            job.attempts_made += 1;
            job.clone()
        }))
    }

    async fn save_progress(&self, job_id: &JobId, data: &JobData) -> Result<(), QueueError> {
        self.with_running(job_id, |job| job.data = data.clone())
    }

    async fn complete(&self, job_id: &JobId) -> Result<(), QueueError> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        jobs.remove(job_id);
        Ok(())
    }

    async fn retry_later(
        &self,
        job_id: &JobId,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), QueueError> {
        self.with_running(job_id, |job| {
            job.state = JobState::Pending;
            job.run_at = run_at;
            job.last_error = Some(error.to_string());
        })
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobEnvelope>, QueueError> {
        let jobs = self.jobs.read().map_err(poison_err)?;
        Ok(jobs.get(job_id).cloned())
    }

    async fn list(&self) -> Result<Vec<JobEnvelope>, QueueError> {
        let jobs = self.jobs.read().map_err(poison_err)?;
        let mut all: Vec<_> = jobs.values().cloned().collect();
        all.sort_by(|a, b| a.run_at.cmp(&b.run_at));
        Ok(all)
    }

    async fn requeue_running(&self) -> Result<u64, QueueError> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        let mut count = 0;
        for job in jobs.values_mut().filter(|j| j.state == JobState::Running) {
            job.state = JobState::Pending;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowplane_types::flow::FlowId;
    use flowplane_types::job::{BackoffPolicy, DeleteFlowJob, SagaPhase};

    fn delete_request(flow_id: FlowId) -> JobRequest {
        JobRequest::immediate(
            JobData::DeleteFlow(DeleteFlowJob {
                flow_id,
                project_id: "p".to_string(),
                completed_phases: Default::default(),
            }),
            BackoffPolicy::Exponential { delay_ms: 10 },
            3,
        )
    }

    #[tokio::test]
    async fn upsert_replaces_pending_job() {
        let queue = InMemoryJobQueue::new();
        let flow_id = FlowId::new();

        assert_eq!(queue.upsert(delete_request(flow_id)).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(queue.upsert(delete_request(flow_id)).await.unwrap(), UpsertOutcome::Replaced);
        assert_eq!(queue.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_onto_running_job_is_ignored() {
        let queue = InMemoryJobQueue::new();
        let flow_id = FlowId::new();
        queue.upsert(delete_request(flow_id)).await.unwrap();

        let claimed = queue.claim_next(Utc::now()).await.unwrap().unwrap();
        assert_eq!(claimed.attempts_made, 1);

        assert_eq!(
            queue.upsert(delete_request(flow_id)).await.unwrap(),
            UpsertOutcome::IgnoredRunning
        );
        let stored = queue.get(&claimed.job_id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Running);
    }

    #[tokio::test]
    async fn claimed_job_is_invisible_until_rescheduled() {
        let queue = InMemoryJobQueue::new();
        queue.upsert(delete_request(FlowId::new())).await.unwrap();

        let job = queue.claim_next(Utc::now()).await.unwrap().unwrap();
        assert!(queue.claim_next(Utc::now()).await.unwrap().is_none());

        let later = Utc::now() + chrono::Duration::seconds(30);
        queue.retry_later(&job.job_id, later, "boom").await.unwrap();
        assert!(queue.claim_next(Utc::now()).await.unwrap().is_none());

        let again = queue.claim_next(later).await.unwrap().unwrap();
        assert_eq!(again.attempts_made, 2);
        assert_eq!(again.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn save_progress_persists_phases() {
        let queue = InMemoryJobQueue::new();
        queue.upsert(delete_request(FlowId::new())).await.unwrap();
        let mut job = queue.claim_next(Utc::now()).await.unwrap().unwrap();

        job.data.mark_completed(SagaPhase::PreDelete);
        queue.save_progress(&job.job_id, &job.data).await.unwrap();

        let stored = queue.get(&job.job_id).await.unwrap().unwrap();
        assert!(stored.data.is_completed(SagaPhase::PreDelete));
    }

    #[tokio::test]
    async fn requeue_running_recovers_claimed_jobs() {
        let queue = InMemoryJobQueue::new();
        queue.upsert(delete_request(FlowId::new())).await.unwrap();
        queue.claim_next(Utc::now()).await.unwrap().unwrap();

        assert_eq!(queue.requeue_running().await.unwrap(), 1);
        assert!(queue.claim_next(Utc::now()).await.unwrap().is_some());
    }
}
