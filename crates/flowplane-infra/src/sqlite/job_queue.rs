//! SQLite-backed durable job queue.
//!
//! Jobs survive a restart: anything left `RUNNING` by a crashed process is
//! returned to `PENDING` through `requeue_running`, and the completed-phase
//! set saved by `save_progress` lets the handler skip work already done.
//! Claims go through the single writer connection, so `UPDATE .. RETURNING`
//! hands each due job to exactly one worker.

use chrono::{DateTime, Utc};
use flowplane_core::queue::JobQueue;
use flowplane_types::error::QueueError;
use flowplane_types::job::{JobData, JobEnvelope, JobId, JobRequest, JobState, UpsertOutcome};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

pub struct SqliteJobQueue {
    pool: DatabasePool,
}

impl SqliteJobQueue {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn storage_err(e: sqlx::Error) -> QueueError {
    QueueError::Storage(e.to_string())
}

fn to_json(value: &impl serde::Serialize) -> Result<String, QueueError> {
    serde_json::to_string(value).map_err(|e| QueueError::Payload(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, QueueError> {
    serde_json::from_str(s).map_err(|e| QueueError::Payload(e.to_string()))
}

struct JobRow {
    job_id: String,
    data: String,
    schedule: String,
    backoff: String,
    attempts_made: i64,
    max_attempts: i64,
    run_at: String,
    last_error: Option<String>,
    state: String,
}

impl JobRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            job_id: row.try_get("job_id")?,
            data: row.try_get("data")?,
            schedule: row.try_get("schedule")?,
            backoff: row.try_get("backoff")?,
            attempts_made: row.try_get("attempts_made")?,
            max_attempts: row.try_get("max_attempts")?,
            run_at: row.try_get("run_at")?,
            last_error: row.try_get("last_error")?,
            state: row.try_get("state")?,
        })
    }

    fn into_envelope(self) -> Result<JobEnvelope, QueueError> {
        Ok(JobEnvelope {
            job_id: JobId(self.job_id),
            data: from_json(&self.data)?,
            schedule: from_json(&self.schedule)?,
            backoff: from_json(&self.backoff)?,
            attempts_made: u32::try_from(self.attempts_made).unwrap_or(u32::MAX),
            max_attempts: u32::try_from(self.max_attempts).unwrap_or(u32::MAX),
            run_at: parse_datetime(&self.run_at).map_err(|e| QueueError::Payload(e.to_string()))?,
            last_error: self.last_error,
            state: self.state.parse::<JobState>().map_err(QueueError::Payload)?,
        })
    }
}

fn row_to_envelope(row: &sqlx::sqlite::SqliteRow) -> Result<JobEnvelope, QueueError> {
    JobRow::from_row(row).map_err(storage_err)?.into_envelope()
}

impl JobQueue for SqliteJobQueue {
    async fn upsert(&self, request: JobRequest) -> Result<UpsertOutcome, QueueError> {
        let envelope = JobEnvelope::from_request(request);
        let now = format_datetime(&Utc::now());

        let mut tx = self.pool.writer.begin().await.map_err(storage_err)?;

        let existing: Option<(String,)> = sqlx::query_as("SELECT state FROM jobs WHERE job_id = ?")
            .bind(envelope.job_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?;

        let outcome = match existing {
            Some((state,)) if state == JobState::Running.as_str() => {
                return Ok(UpsertOutcome::IgnoredRunning);
            }
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };

        sqlx::query(
            r#"INSERT INTO jobs
               (job_id, job_type, data, schedule, backoff, attempts_made, max_attempts,
                run_at, last_error, state, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, 0, ?, ?, NULL, 'PENDING', ?, ?)
               ON CONFLICT (job_id) DO UPDATE SET
                   job_type = excluded.job_type,
                   data = excluded.data,
                   schedule = excluded.schedule,
                   backoff = excluded.backoff,
                   attempts_made = 0,
                   max_attempts = excluded.max_attempts,
                   run_at = excluded.run_at,
                   last_error = NULL,
                   state = 'PENDING',
                   updated_at = excluded.updated_at"#,
        )
        .bind(envelope.job_id.as_str())
        .bind(envelope.data.kind())
        .bind(to_json(&envelope.data)?)
        .bind(to_json(&envelope.schedule)?)
        .bind(to_json(&envelope.backoff)?)
        .bind(i64::from(envelope.max_attempts))
        .bind(format_datetime(&envelope.run_at))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(outcome)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<JobEnvelope>, QueueError> {
        let row = sqlx::query(
            r#"UPDATE jobs SET state = 'RUNNING', attempts_made = attempts_made + 1, updated_at = ?
               WHERE job_id = (
                   SELECT job_id FROM jobs
                   WHERE state = 'PENDING' AND run_at <= ?
                   ORDER BY run_at, job_id
                   LIMIT 1
               )
               RETURNING *"#,
        )
        .bind(format_datetime(&Utc::now()))
        .bind(format_datetime(&now))
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(storage_err)?;

        row.as_ref().map(row_to_envelope).transpose()
    }

    async fn save_progress(&self, job_id: &JobId, data: &JobData) -> Result<(), QueueError> {
        let result = sqlx::query("UPDATE jobs SET data = ?, updated_at = ? WHERE job_id = ?")
            .bind(to_json(data)?)
            .bind(format_datetime(&Utc::now()))
            .bind(job_id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(job_id.to_string()));
        }
        Ok(())
    }

    async fn complete(&self, job_id: &JobId) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM jobs WHERE job_id = ?")
            .bind(job_id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    async fn retry_later(&self, job_id: &JobId, run_at: DateTime<Utc>, error: &str) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'PENDING', run_at = ?, last_error = ?, updated_at = ? WHERE job_id = ?",
        )
        .bind(format_datetime(&run_at))
        .bind(error)
        .bind(format_datetime(&Utc::now()))
        .bind(job_id.as_str())
        .execute(&self.pool.writer)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(job_id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobEnvelope>, QueueError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE job_id = ?")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(storage_err)?;

        row.as_ref().map(row_to_envelope).transpose()
    }

    async fn list(&self) -> Result<Vec<JobEnvelope>, QueueError> {
        let rows = sqlx::query("SELECT * FROM jobs ORDER BY run_at, job_id")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(storage_err)?;

        rows.iter().map(row_to_envelope).collect()
    }

    async fn requeue_running(&self) -> Result<u64, QueueError> {
        let result = sqlx::query("UPDATE jobs SET state = 'PENDING', updated_at = ? WHERE state = 'RUNNING'")
            .bind(format_datetime(&Utc::now()))
            .execute(&self.pool.writer)
            .await
            .map_err(storage_err)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use flowplane_types::flow::{FlowId, FlowStatus};
    use flowplane_types::job::{BackoffPolicy, DeleteFlowJob, SagaPhase, UpdateFlowStatusJob};

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

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

    fn status_request(flow_id: FlowId, status: FlowStatus) -> JobRequest {
        JobRequest::immediate(
            JobData::UpdateFlowStatus(UpdateFlowStatusJob {
                flow_id,
                project_id: "p".to_string(),
                new_status: status,
                completed_phases: Default::default(),
            }),
            BackoffPolicy::Fixed { delay_ms: 10 },
            4,
        )
    }

    #[tokio::test]
    async fn upsert_replaces_pending_and_ignores_running() {
        let queue = SqliteJobQueue::new(test_pool().await);
        let flow_id = FlowId::new();

        let outcome = queue.upsert(status_request(flow_id, FlowStatus::Enabled)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        let outcome = queue.upsert(status_request(flow_id, FlowStatus::Disabled)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Replaced);

        let pending = queue.list().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(matches!(
            &pending[0].data,
            JobData::UpdateFlowStatus(job) if job.new_status == FlowStatus::Disabled
        ));

        queue.claim_next(Utc::now()).await.unwrap().unwrap();
        let outcome = queue.upsert(status_request(flow_id, FlowStatus::Enabled)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::IgnoredRunning);
    }

    #[tokio::test]
    async fn claim_marks_running_and_counts_attempt() {
        let queue = SqliteJobQueue::new(test_pool().await);
        queue.upsert(delete_request(FlowId::new())).await.unwrap();

        let job = queue.claim_next(Utc::now()).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.attempts_made, 1);
        assert!(queue.claim_next(Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn future_jobs_are_not_claimed() {
        let queue = SqliteJobQueue::new(test_pool().await);
        queue.upsert(delete_request(FlowId::new())).await.unwrap();
        let job = queue.claim_next(Utc::now()).await.unwrap().unwrap();

        let later = Utc::now() + Duration::seconds(60);
        queue.retry_later(&job.job_id, later, "engine down").await.unwrap();
        assert!(queue.claim_next(Utc::now()).await.unwrap().is_none());

        let retried = queue.claim_next(later).await.unwrap().unwrap();
        assert_eq!(retried.attempts_made, 2);
        assert_eq!(retried.last_error.as_deref(), Some("engine down"));
    }

    #[tokio::test]
    async fn progress_survives_requeue() {
        let queue = SqliteJobQueue::new(test_pool().await);
        queue.upsert(delete_request(FlowId::new())).await.unwrap();
        let mut job = queue.claim_next(Utc::now()).await.unwrap().unwrap();

        job.data.mark_completed(SagaPhase::PreDelete);
        queue.save_progress(&job.job_id, &job.data).await.unwrap();

        // Simulated crash: the job is still RUNNING.
        assert_eq!(queue.requeue_running().await.unwrap(), 1);
        let resumed = queue.claim_next(Utc::now()).await.unwrap().unwrap();
        assert!(resumed.data.is_completed(SagaPhase::PreDelete));
        assert!(!resumed.data.is_completed(SagaPhase::DbDelete));
    }

    #[tokio::test]
    async fn complete_removes_job() {
        let queue = SqliteJobQueue::new(test_pool().await);
        queue.upsert(delete_request(FlowId::new())).await.unwrap();
        let job = queue.claim_next(Utc::now()).await.unwrap().unwrap();

        queue.complete(&job.job_id).await.unwrap();
        assert!(queue.get(&job.job_id).await.unwrap().is_none());
        assert!(matches!(
            queue.save_progress(&job.job_id, &job.data).await,
            Err(QueueError::NotFound(_))
        ));
    }
}
