//! Background job payloads and envelopes.
//!
//! Lifecycle side effects run as resumable sagas. Each payload carries the set
//! of phases already completed so a redelivered job resumes instead of
//! repeating work.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::{FlowId, FlowStatus};

/// Deterministic job identifier.
///
/// The same logical operation on the same flow always maps to the same id, so
/// re-submitting it replaces the pending job instead of queueing a second one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn update_flow_status(flow_id: &FlowId) -> Self {
        Self(format!("update-flow-status:{flow_id}"))
    }

    pub fn delete_flow(flow_id: &FlowId) -> Self {
        Self(format!("delete-flow:{flow_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named step of a saga. Ordering follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaPhase {
    PreDelete,
    DbDelete,
    PreUpdate,
}

impl SagaPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaPhase::PreDelete => "PRE_DELETE",
            SagaPhase::DbDelete => "DB_DELETE",
            SagaPhase::PreUpdate => "PRE_UPDATE",
        }
    }
}

impl fmt::Display for SagaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a queued job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "jobType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobData {
    DeleteFlow(DeleteFlowJob),
    UpdateFlowStatus(UpdateFlowStatusJob),
}

impl JobData {
    pub fn flow_id(&self) -> FlowId {
        match self {
            JobData::DeleteFlow(job) => job.flow_id,
            JobData::UpdateFlowStatus(job) => job.flow_id,
        }
    }

    pub fn project_id(&self) -> &str {
        match self {
            JobData::DeleteFlow(job) => &job.project_id,
            JobData::UpdateFlowStatus(job) => &job.project_id,
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            JobData::DeleteFlow(job) => JobId::delete_flow(&job.flow_id),
            JobData::UpdateFlowStatus(job) => JobId::update_flow_status(&job.flow_id),
        }
    }

    pub fn completed_phases(&self) -> &BTreeSet<SagaPhase> {
        match self {
            JobData::DeleteFlow(job) => &job.completed_phases,
            JobData::UpdateFlowStatus(job) => &job.completed_phases,
        }
    }

    /// Mark a phase done. Returns `false` if it was already recorded.
    pub fn mark_completed(&mut self, phase: SagaPhase) -> bool {
        match self {
            JobData::DeleteFlow(job) => job.completed_phases.insert(phase),
            JobData::UpdateFlowStatus(job) => job.completed_phases.insert(phase),
        }
    }

    pub fn is_completed(&self, phase: SagaPhase) -> bool {
        self.completed_phases().contains(&phase)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobData::DeleteFlow(_) => "DELETE_FLOW",
            JobData::UpdateFlowStatus(_) => "UPDATE_FLOW_STATUS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFlowJob {
    pub flow_id: FlowId,
    pub project_id: String,
    #[serde(default)]
    pub completed_phases: BTreeSet<SagaPhase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFlowStatusJob {
    pub flow_id: FlowId,
    pub project_id: String,
    pub new_status: FlowStatus,
    #[serde(default)]
    pub completed_phases: BTreeSet<SagaPhase>,
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobSchedule {
    OneTime { date: DateTime<Utc> },
    Repeated { cron: String },
}

impl JobSchedule {
    pub fn now() -> Self {
        JobSchedule::OneTime { date: Utc::now() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackoffPolicy {
    Exponential { delay_ms: u64 },
    Fixed { delay_ms: u64 },
}

impl BackoffPolicy {
    /// Delay before the next attempt after `attempts_made` failed attempts.
    pub fn delay_ms(&self, attempts_made: u32) -> u64 {
        match self {
            BackoffPolicy::Exponential { delay_ms } => {
                let exp = attempts_made.saturating_sub(1).min(20);
                delay_ms.saturating_mul(1u64 << exp)
            }
            BackoffPolicy::Fixed { delay_ms } => *delay_ms,
        }
    }
}

/// What a producer submits to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub job_id: JobId,
    pub data: JobData,
    pub schedule: JobSchedule,
    pub backoff: BackoffPolicy,
    pub max_attempts: u32,
}

impl JobRequest {
    /// A one-shot job due immediately, keyed by its deterministic id.
    pub fn immediate(data: JobData, backoff: BackoffPolicy, max_attempts: u32) -> Self {
        Self {
            job_id: data.job_id(),
            data,
            schedule: JobSchedule::now(),
            backoff,
            max_attempts,
        }
    }

    pub fn run_at(&self) -> DateTime<Utc> {
        match &self.schedule {
            JobSchedule::OneTime { date } => *date,
            JobSchedule::Repeated { .. } => Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobState::Pending),
            "RUNNING" => Ok(JobState::Running),
            other => Err(format!("invalid job state: '{other}'")),
        }
    }
}

/// A job as stored by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    pub job_id: JobId,
    pub data: JobData,
    pub schedule: JobSchedule,
    pub backoff: BackoffPolicy,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub state: JobState,
}

impl JobEnvelope {
    pub fn from_request(request: JobRequest) -> Self {
        let run_at = request.run_at();
        Self {
            job_id: request.job_id,
            data: request.data,
            schedule: request.schedule,
            backoff: request.backoff,
            attempts_made: 0,
            max_attempts: request.max_attempts,
            run_at,
            last_error: None,
            state: JobState::Pending,
        }
    }

    /// Whether the attempt currently running is the last one allowed.
    pub fn is_final_attempt(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

/// How the queue handled an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// A pending job with the same id was replaced.
    Replaced,
    /// A job with the same id is executing; the request was dropped.
    IgnoredRunning,
}
