use std::sync::Arc;

use tracing::{error, info};

use crate::agent::types::{
    ChatMessage, ChatMessageResponse, Conversation, ConversationListResponse,
    MessageListResponse, ResponseMode,
};
use crate::agent::ChatflowApi;
use crate::errors::AppError;
use crate::relay::{EventChannel, StreamingRelay};

#[derive(Clone)]
pub struct ChatService {
    client: Arc<dyn ChatflowApi>,
    relay: StreamingRelay,
}

impl ChatService {
    pub fn new(client: Arc<dyn ChatflowApi>, relay: StreamingRelay) -> Self {
        Self { client, relay }
    }

    /// Sends one message and waits for the complete answer.
    pub async fn send_message(
        &self,
        query: &str,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<ChatMessageResponse, AppError> {
        validate_message(query)?;
        info!(user_id, ?conversation_id, "Sending message: {query}");

        let message = ChatMessage::new(query, user_id, ResponseMode::Blocking)
            .with_conversation_id(conversation_id);
        let response = self.client.send_chat_message(message).await.map_err(|e| {
            error!(user_id, "Failed to send message: {e}");
            e
        })?;

        info!(message_id = ?response.message_id, "Received answer");
        Ok(response)
    }

    /// Sends one message and relays the streamed answer as server-sent events.
    pub async fn stream_message(
        &self,
        query: &str,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<EventChannel, AppError> {
        validate_message(query)?;
        self.relay.relay(query, user_id, conversation_id).await
    }

    pub async fn get_message_history(
        &self,
        conversation_id: &str,
        user_id: &str,
        limit: u32,
    ) -> Result<MessageListResponse, AppError> {
        self.client.get_messages(conversation_id, user_id, limit).await.map_err(|e| {
            error!(conversation_id, user_id, "Failed to fetch message history: {e}");
            e
        })
    }

    pub async fn get_conversations(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<ConversationListResponse, AppError> {
        self.client.get_conversations(user_id, limit).await.map_err(|e| {
            error!(user_id, "Failed to fetch conversations: {e}");
            e
        })
    }

    pub async fn delete_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<(), AppError> {
        self.client.delete_conversation(conversation_id, user_id).await.map_err(|e| {
            error!(conversation_id, user_id, "Failed to delete conversation: {e}");
            e
        })?;
        info!(conversation_id, user_id, "Conversation deleted");
        Ok(())
    }

    pub async fn rename_conversation(
        &self,
        conversation_id: &str,
        name: &str,
        user_id: &str,
    ) -> Result<Conversation, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::empty_field("name"));
        }
        let conversation =
            self.client.rename_conversation(conversation_id, name, user_id).await.map_err(|e| {
                error!(conversation_id, user_id, "Failed to rename conversation: {e}");
                e
            })?;
        info!(conversation_id, name, user_id, "Conversation renamed");
        Ok(conversation)
    }
}

fn validate_message(message: &str) -> Result<(), AppError> {
    if message.trim().is_empty() {
        return Err(AppError::empty_field("message"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_only_blank_messages() {
        assert!(matches!(validate_message("  "), Err(AppError::EmptyField { .. })));
        assert!(validate_message("hello").is_ok());
        assert!(validate_message(&"x".repeat(9_000)).is_ok());
    }
}
