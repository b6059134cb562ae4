//! Request and response bodies of the Dify REST API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Blocking,
    Streaming,
}

/// Body of `POST /chat-messages`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub inputs: Map<String, Value>,
    pub query: String,
    pub user: String,
    pub response_mode: ResponseMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatMessage {
    pub fn new(query: &str, user: &str, response_mode: ResponseMode) -> Self {
        Self {
            inputs: Map::new(),
            query: query.to_string(),
            user: user.to_string(),
            response_mode,
            conversation_id: None,
        }
    }

    /// Continues an existing conversation; blank ids are ignored.
    pub fn with_conversation_id(mut self, conversation_id: Option<&str>) -> Self {
        self.conversation_id =
            conversation_id.filter(|id| !id.trim().is_empty()).map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageResponse {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageListResponse {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub limit: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub introduction: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationListResponse {
    #[serde(default)]
    pub data: Vec<Conversation>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub limit: u32,
}

/// Body of `POST /workflows/run`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowRunRequest {
    pub inputs: Map<String, Value>,
    pub response_mode: ResponseMode,
    pub user: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunResponse {
    #[serde(default)]
    pub workflow_run_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStopResponse {
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunStatus {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub inputs: Option<Value>,
    #[serde(default)]
    pub outputs: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub total_steps: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub elapsed_time: Option<f64>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub finished_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowLogsResponse {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default, rename(serialize = "hasMore"))]
    pub has_more: bool,
    #[serde(default)]
    pub data: Vec<Value>,
}

/// Query for `GET /workflows/logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowLogsQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub page: u32,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn streaming_chat_message_body() {
        let message = ChatMessage::new("hi", "u-1", ResponseMode::Streaming)
            .with_conversation_id(Some("c-1"));
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "inputs": {},
                "query": "hi",
                "user": "u-1",
                "response_mode": "streaming",
                "conversation_id": "c-1"
            })
        );
    }

    #[test]
    fn blank_conversation_id_is_omitted() {
        let message =
            ChatMessage::new("hi", "u-1", ResponseMode::Blocking).with_conversation_id(Some("  "));
        let body = serde_json::to_value(&message).unwrap();
        assert!(body.get("conversation_id").is_none());
    }
}
