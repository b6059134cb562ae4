use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

use crate::models::{DecisionRequest, Role};
use crate::routes::message_error;
use crate::service::auth_service::AuthService;
use crate::service::capability_service::CapabilityService;

const AUTH_HEADER: &str = "X-Auth-Token";

fn auth_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTH_HEADER).and_then(|v| v.to_str().ok())
}

// ── Enterprise ────────────────────────────────────────────────────────────────

/// POST `/api/capability/submit`
pub async fn submit_handler(
    State(auth): State<AuthService>,
    State(svc): State<CapabilityService>,
    headers: HeaderMap,
    Json(body): Json<Map<String, Value>>,
) -> Response {
    let session = match auth
        .require_role(
            auth_token(&headers),
            Role::Enterprise,
            "Please log in with an enterprise account before submitting",
        )
        .await
    {
        Ok(session) => session,
        Err(e) => return message_error(e),
    };

    let submission = svc.create_submission(&body, &session).await;
    Json(json!({
        "success": true,
        "message": "Submitted, awaiting administrator review",
        "submission": submission,
    }))
    .into_response()
}

/// GET `/api/capability/my-submissions`
pub async fn my_submissions_handler(
    State(auth): State<AuthService>,
    State(svc): State<CapabilityService>,
    headers: HeaderMap,
) -> Response {
    match auth
        .require_role(
            auth_token(&headers),
            Role::Enterprise,
            "Please log in with an enterprise account to view your submissions",
        )
        .await
    {
        Ok(session) => Json(svc.list_submissions_by_user(&session.username).await).into_response(),
        Err(e) => message_error(e),
    }
}

// ── Admin ─────────────────────────────────────────────────────────────────────

/// GET `/api/capability/submissions`
pub async fn list_handler(
    State(auth): State<AuthService>,
    State(svc): State<CapabilityService>,
    headers: HeaderMap,
) -> Response {
    match auth
        .require_role(auth_token(&headers), Role::Admin, "Only administrators can list submissions")
        .await
    {
        Ok(_) => Json(svc.list_submissions().await).into_response(),
        Err(e) => message_error(e),
    }
}

/// GET `/api/capability/submissions/{id}`
pub async fn get_handler(
    Path(id): Path<String>,
    State(auth): State<AuthService>,
    State(svc): State<CapabilityService>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = auth
        .require_role(auth_token(&headers), Role::Admin, "Only administrators can view submissions")
        .await
    {
        return message_error(e);
    }

    match svc.get_submission(&id).await {
        Ok(submission) => Json(submission).into_response(),
        Err(e) => message_error(e),
    }
}

/// POST `/api/capability/submissions/{id}/decision`
pub async fn decision_handler(
    Path(id): Path<String>,
    State(auth): State<AuthService>,
    State(svc): State<CapabilityService>,
    headers: HeaderMap,
    Json(req): Json<DecisionRequest>,
) -> Response {
    let reviewer = match auth
        .require_role(auth_token(&headers), Role::Admin, "Only administrators can review submissions")
        .await
    {
        Ok(session) => session,
        Err(e) => return message_error(e),
    };

    match svc.decide(&id, req.decision.as_deref(), &req.remark, &reviewer).await {
        Ok(submission) => Json(json!({ "success": true, "submission": submission })).into_response(),
        Err(e) => message_error(e),
    }
}
