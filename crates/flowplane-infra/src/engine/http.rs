//! HTTP client for the trigger engine.
//!
//! Every call is a JSON `POST {base_url}/v1/triggers/{action}`. Transport
//! failures map to [`EngineError::Unreachable`], non-2xx answers to
//! [`EngineError::Rejected`] carrying the status, and undecodable bodies to
//! [`EngineError::InvalidResponse`].

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use flowplane_core::engine::TriggerEngine;
use flowplane_types::error::EngineError;
use flowplane_types::flow::FlowVersion;
use flowplane_types::trigger::{
    PieceTriggerDefinition, PollRequest, PollingItem, TestTriggerOutcome, TriggerRegistration,
    TriggerSource,
};

pub struct HttpTriggerEngine {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionBody<'a> {
    version: &'a FlowVersion,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody<'a> {
    version: &'a FlowVersion,
    project_id: &'a str,
    simulate: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnregisterBody<'a> {
    source: &'a TriggerSource,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PollBody<'a> {
    version: &'a FlowVersion,
    project_id: &'a str,
    #[serde(flatten)]
    request: PollRequest,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TestBody<'a> {
    version: &'a FlowVersion,
    project_id: &'a str,
}

impl HttpTriggerEngine {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Unreachable(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, action: &str) -> String {
        format!("{}/v1/triggers/{action}", self.base_url)
    }

    async fn send<B: Serialize>(&self, action: &str, body: &B) -> Result<reqwest::Response, EngineError> {
        let response = self
            .client
            .post(self.url(action))
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::Unreachable(format!("{action}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::debug!(action, status = status.as_u16(), %message, "trigger engine rejected request");
            return Err(EngineError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn call<B: Serialize, R: DeserializeOwned>(&self, action: &str, body: &B) -> Result<R, EngineError> {
        self.send(action, body)
            .await?
            .json::<R>()
            .await
            .map_err(|e| EngineError::InvalidResponse(format!("{action}: {e}")))
    }
}

impl TriggerEngine for HttpTriggerEngine {
    async fn resolve_trigger(&self, version: &FlowVersion) -> Result<PieceTriggerDefinition, EngineError> {
        self.call("resolve", &VersionBody { version }).await
    }

    async fn register(
        &self,
        version: &FlowVersion,
        project_id: &str,
        simulate: bool,
    ) -> Result<TriggerRegistration, EngineError> {
        self.call(
            "register",
            &RegisterBody {
                version,
                project_id,
                simulate,
            },
        )
        .await
    }

    async fn unregister(&self, source: &TriggerSource) -> Result<(), EngineError> {
        self.send("unregister", &UnregisterBody { source }).await?;
        Ok(())
    }

    async fn poll(
        &self,
        version: &FlowVersion,
        project_id: &str,
        request: PollRequest,
    ) -> Result<Vec<PollingItem>, EngineError> {
        self.call(
            "poll",
            &PollBody {
                version,
                project_id,
                request,
            },
        )
        .await
    }

    async fn test(&self, version: &FlowVersion, project_id: &str) -> Result<TestTriggerOutcome, EngineError> {
        self.call("test", &TestBody { version, project_id }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use flowplane_types::flow::FlowId;
    use serde_json::{Value, json};

    async fn spawn_engine(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn engine(base_url: String) -> HttpTriggerEngine {
        HttpTriggerEngine::new(base_url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn resolve_decodes_definition() {
        let router = Router::new().route(
            "/v1/triggers/resolve",
            post(|| async {
                Json(json!({
                    "pieceName": "@pieces/gmail",
                    "pieceVersion": "0.3.1",
                    "triggerName": "new_email",
                    "triggerType": "POLLING",
                    "handshake": null
                }))
            }),
        );
        let engine = engine(spawn_engine(router).await);

        let version = FlowVersion::empty_draft(FlowId::new(), "f");
        let definition = engine.resolve_trigger(&version).await.unwrap();
        assert_eq!(definition.trigger_name, "new_email");
        assert!(matches!(
            definition.trigger_type,
            flowplane_types::trigger::TriggerSourceType::Polling
        ));
    }

    #[tokio::test]
    async fn poll_sends_cursor_and_limit() {
        let router = Router::new().route(
            "/v1/triggers/poll",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["lastFetchEpochMS"], json!(1500));
                assert_eq!(body["maxItems"], json!(5));
                assert_eq!(body["projectId"], json!("proj-1"));
                Json(json!([{ "epochMilliSeconds": 2000, "data": { "id": 1 } }]))
            }),
        );
        let engine = engine(spawn_engine(router).await);

        let version = FlowVersion::empty_draft(FlowId::new(), "f");
        let items = engine
            .poll(
                &version,
                "proj-1",
                PollRequest {
                    last_fetch_epoch_ms: 1500,
                    max_items: Some(5),
                },
            )
            .await
            .unwrap();
        assert_eq!(items, vec![PollingItem::new(2000, json!({ "id": 1 }))]);
    }

    #[tokio::test]
    async fn rejection_carries_status() {
        let router = Router::new().route(
            "/v1/triggers/test",
            post(|| async { (StatusCode::BAD_REQUEST, "missing auth") }),
        );
        let engine = engine(spawn_engine(router).await);

        let version = FlowVersion::empty_draft(FlowId::new(), "f");
        let err = engine.test(&version, "proj-1").await.unwrap_err();
        match err {
            EngineError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "missing auth");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let router = Router::new().route(
            "/v1/triggers/resolve",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let engine = engine(spawn_engine(router).await);

        let version = FlowVersion::empty_draft(FlowId::new(), "f");
        let err = engine.resolve_trigger(&version).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn unreachable_engine_is_transient() {
        let engine = engine("http://127.0.0.1:1".to_string());
        let version = FlowVersion::empty_draft(FlowId::new(), "f");
        let err = engine.resolve_trigger(&version).await.unwrap_err();
        assert!(matches!(err, EngineError::Unreachable(_)));
        assert!(err.is_transient());
    }
}
