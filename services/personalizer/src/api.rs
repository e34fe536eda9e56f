use crate::config::ApiConfig;
use crate::pipeline::{InvocationResponse, Pipeline, RunOutcome};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/invocations", post(invoke))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "currents-personalizer"
    }))
}

/// Run the pipeline for one file-arrival notification
async fn invoke(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let outcome = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(notification) => state.pipeline.run(&notification).await,
        Err(e) => {
            warn!(error = %e, "Invocation body is not JSON");
            RunOutcome::Failed {
                error: format!("Invalid notification payload: {e}"),
            }
        }
    };

    into_http(outcome.to_response())
}

fn into_http(response: InvocationResponse) -> (StatusCode, Json<InvocationResponse>) {
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response))
}

/// Start the invocation API server, stopping when `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting invocation API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineSettings;
    use crate::testing::{avro_container, event, FakeSource, MemoryStore, ScriptedGenerator};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn router(source: FakeSource) -> Router {
        let pipeline = Pipeline::new(
            Arc::new(source),
            Arc::new(ScriptedGenerator::replying("```json\n{\"email_title\": \"Hi\"}\n```")),
            Arc::new(MemoryStore::default()),
            PipelineSettings {
                target_event: "view_content".to_string(),
                fetch_timeout: Duration::from_secs(5),
                generation_timeout: Duration::from_secs(5),
                persistence_timeout: Duration::from_secs(5),
            },
        );

        create_router(AppState {
            pipeline: Arc::new(pipeline),
        })
    }

    async fn post_invocation(router: Router, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/invocations")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_invocation_returns_envelope() {
        let bytes = avro_container(&[event("view_content", Some("u1"), "{}")]);
        let notification = json!({
            "Records": [{ "s3": { "bucket": { "name": "b" }, "object": { "key": "k.avro" } } }]
        });

        let (status, envelope) = post_invocation(router(FakeSource::Bytes(bytes)), &notification.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope["statusCode"], 200);
        let body: Value = serde_json::from_str(envelope["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["processed_count"], 1);
        assert_eq!(body["file_processed"], "k.avro");
    }

    #[tokio::test]
    async fn test_malformed_body_is_fatal_envelope() {
        let (status, envelope) = post_invocation(router(FakeSource::Unreachable), "{not json").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(envelope["statusCode"], 500);
        let body: Value = serde_json::from_str(envelope["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_health_check() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = router(FakeSource::Unreachable).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
