//! HTTP request handlers for the REST API.

pub mod events;
pub mod flow;
pub mod test_trigger;

use flowplane_types::error::FlowError;
use flowplane_types::flow::FlowId;

use crate::http::error::AppError;

/// Parse a path id; an unparseable id is reported as a missing flow.
pub(crate) fn parse_flow_id(raw: &str) -> Result<FlowId, AppError> {
    raw.parse()
        .map_err(|_| AppError::Flow(FlowError::NotFound(format!("flow {raw}"))))
}
