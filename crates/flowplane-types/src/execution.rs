//! Denormalized view of a flow handed to the run path.

use serde::{Deserialize, Serialize};

use crate::flow::{Flow, FlowVersion};
use crate::trigger::HandshakeConfig;

/// Everything needed to start a run of a flow without touching the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowExecutionSnapshot {
    pub flow: Flow,
    pub published_version: Option<FlowVersion>,
    pub handshake: Option<HandshakeConfig>,
    pub platform_id: String,
}
