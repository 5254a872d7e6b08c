//! Test trigger session handlers used by the flow editor.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};

use flowplane_types::trigger::TestTriggerSession;

use crate::http::error::AppError;
use crate::http::handlers::parse_flow_id;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// POST /api/v1/flows/{id}/test-trigger - Start a test session.
pub async fn start_test_trigger(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<TestTriggerSession>>, AppError> {
    let start = Instant::now();
    let flow_id = parse_flow_id(&id)?;
    let flow = state.flow_service.get(&flow_id).await?.flow;

    let session = state.test_triggers.start(&flow_id, &flow.project_id).await?;
    Ok(Json(
        ApiResponse::success(session, start)
            .with_link("sample", &format!("/api/v1/flows/{flow_id}/test-trigger/sample")),
    ))
}

/// DELETE /api/v1/flows/{id}/test-trigger - Cancel the simulate registration.
pub async fn cancel_test_trigger(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let start = Instant::now();
    let flow_id = parse_flow_id(&id)?;
    let flow = state.flow_service.get(&flow_id).await?.flow;

    state.test_triggers.cancel(&flow_id, &flow.project_id).await?;
    Ok(Json(ApiResponse::success(json!({ "cancelled": true }), start)))
}

/// POST /api/v1/flows/{id}/test-trigger/sample - Deliver the event received
/// by a simulate registration. The body is stored as the sample payload.
pub async fn capture_sample(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let start = Instant::now();
    let flow_id = parse_flow_id(&id)?;
    let flow = state.flow_service.get(&flow_id).await?.flow;

    state
        .test_triggers
        .capture_sample(&flow_id, &flow.project_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(json!({ "captured": true }), start)))
}

/// GET /api/v1/flows/{id}/test-trigger/sample - Last captured sample.
pub async fn get_sample(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Option<Value>>>, AppError> {
    let start = Instant::now();
    let flow_id = parse_flow_id(&id)?;
    let sample = state.test_triggers.sample(&flow_id).await?;
    Ok(Json(ApiResponse::success(sample, start)))
}
