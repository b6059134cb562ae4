pub mod auth_routes;
pub mod capability_routes;
pub mod chat_routes;
pub mod workflow_routes;

use std::path::Path;

use axum::extract::FromRef;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::service::auth_service::AuthService;
use crate::service::capability_service::CapabilityService;
use crate::service::chat_service::ChatService;
use crate::service::workflow_service::WorkflowService;

/// Everything the handlers need; each handler extracts only its own service.
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub workflow: WorkflowService,
    pub auth: AuthService,
    pub capability: CapabilityService,
}

impl FromRef<AppState> for ChatService {
    fn from_ref(state: &AppState) -> Self {
        state.chat.clone()
    }
}

impl FromRef<AppState> for WorkflowService {
    fn from_ref(state: &AppState) -> Self {
        state.workflow.clone()
    }
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for CapabilityService {
    fn from_ref(state: &AppState) -> Self {
        state.capability.clone()
    }
}

pub fn build_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    let api = Router::new()
        // Chat
        .route("/api/chat/send", post(chat_routes::send_handler))
        .route("/api/chat/send-stream", post(chat_routes::send_stream_handler))
        .route("/api/chat/history/{conversation_id}", get(chat_routes::history_handler))
        .route("/api/chat/conversations", get(chat_routes::conversations_handler))
        .route(
            "/api/chat/conversations/{conversation_id}",
            delete(chat_routes::delete_conversation_handler),
        )
        .route(
            "/api/chat/conversations/{conversation_id}/name",
            put(chat_routes::rename_conversation_handler),
        )
        // Workflow
        .route("/api/workflow/execute", post(workflow_routes::execute_handler))
        .route("/api/workflow/execute-stream", post(workflow_routes::execute_stream_handler))
        .route("/api/workflow/stop", post(workflow_routes::stop_handler))
        .route("/api/workflow/runs/{workflow_run_id}", get(workflow_routes::run_handler))
        .route("/api/workflow/logs", get(workflow_routes::logs_handler))
        // Auth
        .route("/api/auth/login", post(auth_routes::login_handler))
        .route("/api/auth/validate", get(auth_routes::validate_handler))
        // Capability submissions
        .route("/api/capability/submit", post(capability_routes::submit_handler))
        .route("/api/capability/submissions", get(capability_routes::list_handler))
        .route("/api/capability/submissions/{id}", get(capability_routes::get_handler))
        .route("/api/capability/my-submissions", get(capability_routes::my_submissions_handler))
        .route(
            "/api/capability/submissions/{id}/decision",
            post(capability_routes::decision_handler),
        )
        .with_state(state);

    api.fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Wraps a payload as `{"success": true, ...payload}`.
#[derive(Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

impl<T: Serialize> Success<T> {
    pub fn new(body: T) -> Json<Self> {
        Json(Self { success: true, body })
    }
}

/// A required string field: absent and blank are both rejected.
pub(crate) fn required(value: Option<String>, field_name: &str) -> Result<String, AppError> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| AppError::empty_field(field_name))
}

/// Error body used by the auth and capability endpoints: `{success, message}`.
pub(crate) fn message_error(err: AppError) -> Response {
    let status: StatusCode = err.status_code();
    (status, Json(json!({ "success": false, "message": err.to_string() }))).into_response()
}
