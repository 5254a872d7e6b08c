//! Query parameter extractors for list endpoints.

use serde::Deserialize;

/// Query parameters for the flow list endpoint.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FlowListQuery {
    pub project_id: Option<String>,
}
