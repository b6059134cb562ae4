use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::errors::AppError;
use crate::models::{
    PageResponse, RenameRequest, RenameResponse, SendMessageRequest, SendMessageResponse,
    UserQuery,
};
use crate::routes::required;
use crate::service::chat_service::ChatService;

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST `/api/chat/send` — blocking chat call
pub async fn send_handler(
    State(svc): State<ChatService>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, AppError> {
    let message = required(req.message, "message")?;
    let user_id = required(req.user_id, "userId")?;

    let response = svc.send_message(&message, &user_id, req.conversation_id.as_deref()).await?;
    Ok(Json(SendMessageResponse {
        success: true,
        message_id: response.message_id,
        conversation_id: response.conversation_id,
        answer: response.answer,
        mode: response.mode,
        created_at: response.created_at,
        metadata: response.metadata,
    }))
}

/// POST `/api/chat/send-stream` — relays the answer as `chunk`/`done`/`error` events
pub async fn send_stream_handler(
    State(svc): State<ChatService>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = required(req.message, "message")?;
    let user_id = required(req.user_id, "userId")?;

    svc.stream_message(&message, &user_id, req.conversation_id.as_deref()).await
}

/// GET `/api/chat/history/{conversation_id}?userId=&limit=`
pub async fn history_handler(
    Path(conversation_id): Path<String>,
    Query(query): Query<UserQuery>,
    State(svc): State<ChatService>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = required(query.user_id, "userId")?;
    let history = svc.get_message_history(&conversation_id, &user_id, query.limit).await?;
    Ok(Json(PageResponse {
        success: true,
        data: history.data,
        has_more: history.has_more,
        limit: history.limit,
    }))
}

/// GET `/api/chat/conversations?userId=&limit=`
pub async fn conversations_handler(
    Query(query): Query<UserQuery>,
    State(svc): State<ChatService>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = required(query.user_id, "userId")?;
    let conversations = svc.get_conversations(&user_id, query.limit).await?;
    Ok(Json(PageResponse {
        success: true,
        data: conversations.data,
        has_more: conversations.has_more,
        limit: conversations.limit,
    }))
}

/// DELETE `/api/chat/conversations/{conversation_id}?userId=`
pub async fn delete_conversation_handler(
    Path(conversation_id): Path<String>,
    Query(query): Query<UserQuery>,
    State(svc): State<ChatService>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = required(query.user_id, "userId")?;
    svc.delete_conversation(&conversation_id, &user_id).await?;
    Ok(Json(json!({ "success": true, "message": "Conversation deleted" })))
}

/// PUT `/api/chat/conversations/{conversation_id}/name`
pub async fn rename_conversation_handler(
    Path(conversation_id): Path<String>,
    State(svc): State<ChatService>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<RenameResponse>, AppError> {
    let name = required(req.name, "name")?;
    let user_id = required(req.user_id, "userId")?;

    let conversation = svc.rename_conversation(&conversation_id, &name, &user_id).await?;
    Ok(Json(RenameResponse { success: true, conversation }))
}
