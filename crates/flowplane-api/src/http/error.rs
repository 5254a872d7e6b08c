//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use flowplane_types::error::FlowError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Flow(FlowError),
    /// Malformed request input caught before reaching a service.
    Validation(String),
}

impl From<FlowError> for AppError {
    fn from(e: FlowError) -> Self {
        AppError::Flow(e)
    }
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Flow(e) => {
                let status = match e {
                    FlowError::OperationInProgress(_) | FlowError::InUse => StatusCode::CONFLICT,
                    FlowError::NotFound(_) => StatusCode::NOT_FOUND,
                    FlowError::Validation(_) => StatusCode::BAD_REQUEST,
                    FlowError::TestTriggerFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    FlowError::LockTimeout(_) => StatusCode::LOCKED,
                    FlowError::Engine(_) => StatusCode::BAD_GATEWAY,
                    FlowError::Storage(_) | FlowError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.code())
            }
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Flow(e) => e.to_string(),
            AppError::Validation(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        }

        let body = serde_json::to_string(&ApiResponse::error(code, message)).unwrap_or_else(|_| {
            r#"{"errors":[{"code":"SERIALIZATION_ERROR","message":"Failed to serialize response"}]}"#.to_string()
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
