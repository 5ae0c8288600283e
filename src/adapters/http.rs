use crate::adapters::storage::AuditBackendStore;
use crate::core::orchestrator::RequestOrchestrator;
use crate::core::reputation::ReputationChecker;
use crate::domain::model::InboundRequest;
use crate::utils::error::GatewayError;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, OriginalUri, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub type GatewayOrchestrator = RequestOrchestrator<ReputationChecker, AuditBackendStore>;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<GatewayOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: GatewayOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.user_friendly_message(),
            },
        };
        (self.status_code(), Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(convert))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// 把分隔文件轉成 JSON。處理放在獨立的 task 裡，
/// 連線中斷時 handler 被丟棄也不會中斷審計寫入。
async fn convert(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Response {
    let request_uri = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let request = InboundRequest {
        request_uri,
        caller_ip: peer.ip().to_string(),
        body: String::from_utf8_lossy(&body).into_owned(),
    };

    let orchestrator = state.orchestrator.clone();
    let outcome = match tokio::spawn(async move { orchestrator.handle(request).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Conversion task failed: {}", e);
            return GatewayError::InternalFailure {
                message: e.to_string(),
            }
            .into_response();
        }
    };

    let mut response = match outcome.result {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => e.into_response(),
    };

    if let Ok(value) = HeaderValue::from_str(&outcome.request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
