//! Flow CRUD and lifecycle handlers.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};

use flowplane_types::execution::FlowExecutionSnapshot;
use flowplane_types::error::FlowError;
use flowplane_types::flow::{CreateFlowRequest, Flow, FlowOperation, PopulatedFlow};

use crate::http::error::AppError;
use crate::http::extractors::query::FlowListQuery;
use crate::http::extractors::user::ActingUser;
use crate::http::handlers::parse_flow_id;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// POST /api/v1/flows - Create a disabled flow with an empty draft.
pub async fn create_flow(
    State(state): State<AppState>,
    Json(body): Json<CreateFlowRequest>,
) -> Result<Json<ApiResponse<PopulatedFlow>>, AppError> {
    let start = Instant::now();
    let created = state.flow_service.create(body).await?;
    let link = format!("/api/v1/flows/{}", created.flow.id);
    Ok(Json(ApiResponse::success(created, start).with_link("self", &link)))
}

/// GET /api/v1/flows?projectId= - List a project's flows.
pub async fn list_flows(
    State(state): State<AppState>,
    Query(query): Query<FlowListQuery>,
) -> Result<Json<ApiResponse<Vec<Flow>>>, AppError> {
    let start = Instant::now();
    let project_id = query
        .project_id
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::Validation("projectId query parameter is required".to_string()))?;

    let flows = state.flow_service.list(&project_id).await?;
    Ok(Json(
        ApiResponse::success(flows, start).with_link("self", &format!("/api/v1/flows?projectId={project_id}")),
    ))
}

/// GET /api/v1/flows/{id} - A flow joined with its current version.
pub async fn get_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PopulatedFlow>>, AppError> {
    let start = Instant::now();
    let flow_id = parse_flow_id(&id)?;
    let flow = state.flow_service.get(&flow_id).await?;
    Ok(Json(
        ApiResponse::success(flow, start)
            .with_link("self", &format!("/api/v1/flows/{flow_id}"))
            .with_link("testTrigger", &format!("/api/v1/flows/{flow_id}/test-trigger")),
    ))
}

/// POST /api/v1/flows/{id} - Apply an operation.
///
/// Lifecycle operations return immediately with the in-flight
/// `operationStatus`; a worker settles the final status.
pub async fn update_flow(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<String>,
    Json(operation): Json<FlowOperation>,
) -> Result<Json<ApiResponse<PopulatedFlow>>, AppError> {
    let start = Instant::now();
    let flow_id = parse_flow_id(&id)?;
    let updated = state
        .flow_service
        .update(&flow_id, user.as_deref(), operation)
        .await?;
    Ok(Json(
        ApiResponse::success(updated, start).with_link("self", &format!("/api/v1/flows/{flow_id}")),
    ))
}

/// DELETE /api/v1/flows/{id} - Mark the flow DELETING and queue its removal.
pub async fn delete_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Flow>>, AppError> {
    let start = Instant::now();
    let flow_id = parse_flow_id(&id)?;
    let flow = state.flow_service.delete(&flow_id).await?;
    Ok(Json(ApiResponse::success(flow, start)))
}

/// GET /api/v1/flows/{id}/snapshot - Cached execution snapshot.
pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<FlowExecutionSnapshot>>, AppError> {
    let start = Instant::now();
    let flow_id = parse_flow_id(&id)?;
    let snapshot = state
        .cache
        .get(&flow_id, state.flows.as_ref(), state.sources.as_ref())
        .await?
        .ok_or_else(|| FlowError::NotFound(format!("flow {flow_id}")))?;
    Ok(Json(ApiResponse::success(snapshot, start)))
}
