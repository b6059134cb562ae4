use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::errors::AppError;
use crate::models::{LoginRequest, SessionResponse, TokenQuery};
use crate::routes::message_error;
use crate::service::auth_service::AuthService;

/// POST `/api/auth/login`
pub async fn login_handler(
    State(auth): State<AuthService>,
    Json(req): Json<LoginRequest>,
) -> Response {
    let username = req.username.unwrap_or_default();
    let password = req.password.unwrap_or_default();

    match auth.login(username.trim(), &password).await {
        Some(session) => Json(SessionResponse::from(session)).into_response(),
        None => message_error(AppError::unauthorized("Invalid username or password")),
    }
}

/// GET `/api/auth/validate?token=`
pub async fn validate_handler(
    State(auth): State<AuthService>,
    Query(query): Query<TokenQuery>,
) -> Response {
    match auth.validate(query.token.as_deref()).await {
        Some(session) => Json(SessionResponse::from(session)).into_response(),
        None => message_error(AppError::unauthorized("Invalid or expired token")),
    }
}
