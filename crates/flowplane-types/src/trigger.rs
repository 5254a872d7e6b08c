//! Trigger registration types.
//!
//! A `TriggerSource` records one active registration of a flow's trigger with
//! the outside world (a webhook subscription or a poll schedule). The rest of
//! this module models what the trigger engine gateway hands back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::flow::{FlowId, FlowVersionId};

/// An external registration of a flow's trigger.
///
/// At most one row with `deleted_at == None` exists per `(flow_id, simulate)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSource {
    pub id: Uuid,
    pub flow_id: FlowId,
    pub flow_version_id: FlowVersionId,
    pub project_id: String,
    /// `true` for the short-lived sample-capturing registration used by the
    /// editor, `false` for the production registration.
    pub simulate: bool,
    pub trigger_type: TriggerSourceType,
    pub piece_name: String,
    pub trigger_name: String,
    pub schedule: Option<ScheduleOptions>,
    pub handshake: Option<HandshakeConfig>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TriggerSource {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn is_polling(&self) -> bool {
        self.trigger_type == TriggerSourceType::Polling
    }
}

/// How a piece trigger receives events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSourceType {
    Webhook,
    AppWebhook,
    Polling,
}

impl TriggerSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSourceType::Webhook => "WEBHOOK",
            TriggerSourceType::AppWebhook => "APP_WEBHOOK",
            TriggerSourceType::Polling => "POLLING",
        }
    }
}

impl fmt::Display for TriggerSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerSourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "WEBHOOK" => Ok(TriggerSourceType::Webhook),
            "APP_WEBHOOK" => Ok(TriggerSourceType::AppWebhook),
            "POLLING" => Ok(TriggerSourceType::Polling),
            other => Err(format!("invalid trigger source type: '{other}'")),
        }
    }
}

/// Poll schedule attached to a polling registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleOptions {
    pub cron_expression: String,
    pub timezone: String,
}

/// How the webhook endpoint must answer the provider's verification handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeConfig {
    pub strategy: HandshakeStrategy,
    /// Header or query parameter carrying the challenge.
    pub param_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandshakeStrategy {
    None,
    HeaderPresent,
    QueryPresent,
    BodyParamPresent,
}

// ---------------------------------------------------------------------------
// Gateway payloads
// ---------------------------------------------------------------------------

/// The piece trigger behind a flow version, as resolved by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceTriggerDefinition {
    pub piece_name: String,
    pub piece_version: String,
    pub trigger_name: String,
    pub trigger_type: TriggerSourceType,
    pub handshake: Option<HandshakeConfig>,
}

/// What the engine returns after registering a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRegistration {
    pub trigger_type: TriggerSourceType,
    pub schedule: Option<ScheduleOptions>,
    pub handshake: Option<HandshakeConfig>,
}

/// One candidate item returned by a poll, stamped with its source timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingItem {
    pub epoch_milli_seconds: i64,
    pub data: Value,
}

impl PollingItem {
    pub fn new(epoch_milli_seconds: i64, data: Value) -> Self {
        Self {
            epoch_milli_seconds,
            data,
        }
    }
}

/// Parameters for one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    #[serde(rename = "lastFetchEpochMS")]
    pub last_fetch_epoch_ms: i64,
    /// Upper bound on items fetched; set for the cursor-seeding first poll.
    pub max_items: Option<usize>,
}

/// Result of a piece's test invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestTriggerOutcome {
    pub success: bool,
    pub message: Option<String>,
    #[serde(default)]
    pub output: Vec<Value>,
}

/// Outcome of starting a test trigger session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestTriggerSession {
    /// A simulate registration is live and waiting for its first event.
    Listening { source: TriggerSource },
    /// The trigger was polled directly; these are the sample items.
    Sampled { items: Vec<Value> },
}
