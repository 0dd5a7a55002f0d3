//! The inbound webhook endpoint and the read-only graph/stats API.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::graph::ConversationGraph;
use crate::models::CallCompleteEvent;
use crate::progress::ProgressTracker;
use crate::webhook::WebhookCorrelator;

#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<ConversationGraph>,
    pub correlator: Arc<WebhookCorrelator>,
    pub progress: Arc<ProgressTracker>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/call-complete", post(handle_webhook))
        .route("/graph", get(handle_graph))
        .route("/stats", get(handle_stats))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_webhook(
    State(state): State<AppState>,
    body: Result<Json<CallCompleteEvent>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    match body {
        Ok(Json(event)) => {
            state.correlator.resolve(event).await;
            StatusCode::OK
        }
        Err(rejection) => {
            warn!(error = %rejection, "rejected malformed call-complete webhook body");
            StatusCode::BAD_REQUEST
        }
    }
}

async fn handle_graph(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.graph.snapshot().await)
}

async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.progress.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState {
            graph: ConversationGraph::new(0.85),
            correlator: WebhookCorrelator::new(Duration::from_secs(5)),
            progress: Arc::new(ProgressTracker::new(20)),
        }
    }

    #[tokio::test]
    async fn malformed_webhook_body_returns_400() {
        let app = router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/webhook/call-complete")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn well_formed_webhook_resolves_a_waiting_call() {
        let state = test_state();
        let correlator = state.correlator.clone();
        let app = router(state);

        let waiter = tokio::spawn(async move {
            correlator
                .await_completion("call-xyz", Duration::from_secs(2))
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;

        let body = r#"{"call_id": "call-xyz", "status": "completed", "recording_url": "mock://r"}"#;
        let request = Request::builder()
            .method("POST")
            .uri("/webhook/call-complete")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn graph_endpoint_returns_current_snapshot() {
        let state = test_state();
        state.graph.get_or_create_node("Welcome.").await;
        let app = router(state);

        let request = Request::builder()
            .uri("/graph")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
