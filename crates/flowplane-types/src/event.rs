//! Notifications published by the control plane.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::flow::{Flow, FlowId};

/// Whether a lifecycle job succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationOutcome {
    Success,
    Failed,
}

/// Events broadcast to subscribers (the SSE stream, tests, the CLI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowEvent {
    #[serde(rename_all = "camelCase")]
    FlowStatusUpdated {
        project_id: String,
        flow: Flow,
        status: OperationOutcome,
        error: Option<String>,
        /// Trigger metadata of the failing registration, if any.
        trigger: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    FlowDeleted { project_id: String, flow_id: FlowId },
    #[serde(rename_all = "camelCase")]
    TestTriggerSampleCaptured {
        project_id: String,
        flow_id: FlowId,
        sample: Value,
    },
    #[serde(rename_all = "camelCase")]
    PolledItemsReady {
        project_id: String,
        flow_id: FlowId,
        items: Vec<Value>,
    },
}

impl FlowEvent {
    pub fn project_id(&self) -> &str {
        match self {
            FlowEvent::FlowStatusUpdated { project_id, .. }
            | FlowEvent::FlowDeleted { project_id, .. }
            | FlowEvent::TestTriggerSampleCaptured { project_id, .. }
            | FlowEvent::PolledItemsReady { project_id, .. } => project_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FlowEvent::FlowStatusUpdated { .. } => "FLOW_STATUS_UPDATED",
            FlowEvent::FlowDeleted { .. } => "FLOW_DELETED",
            FlowEvent::TestTriggerSampleCaptured { .. } => "TEST_TRIGGER_SAMPLE_CAPTURED",
            FlowEvent::PolledItemsReady { .. } => "POLLED_ITEMS_READY",
        }
    }
}
