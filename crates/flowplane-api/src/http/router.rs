//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`. Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/flows",
            post(handlers::flow::create_flow).get(handlers::flow::list_flows),
        )
        .route(
            "/flows/{id}",
            get(handlers::flow::get_flow)
                .post(handlers::flow::update_flow)
                .delete(handlers::flow::delete_flow),
        )
        .route("/flows/{id}/snapshot", get(handlers::flow::get_snapshot))
        // Test trigger sessions
        .route(
            "/flows/{id}/test-trigger",
            post(handlers::test_trigger::start_test_trigger).delete(handlers::test_trigger::cancel_test_trigger),
        )
        .route(
            "/flows/{id}/test-trigger/sample",
            post(handlers::test_trigger::capture_sample).get(handlers::test_trigger::get_sample),
        )
        // Notifications
        .route("/projects/{project_id}/events", get(handlers::events::project_events))
        .route("/health", get(health_check));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
