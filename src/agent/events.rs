use serde_json::Value;

/// A chatflow stream event, reduced to the kinds the relay cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// `message` / `agent_message`: an incremental piece of the answer.
    Chunk {
        answer: String,
        conversation_id: Option<String>,
        message_id: Option<String>,
    },
    /// `message_end`: the answer is complete.
    End {
        message_id: Option<String>,
        conversation_id: Option<String>,
    },
    /// `error`: Dify reported a logical failure.
    Error { message: String, code: Option<String> },
    /// The transport failed while reading the stream.
    Exception(String),
    /// Files, TTS, agent thoughts/logs, replace, ping and anything newer.
    Other { kind: String },
}

impl UpstreamEvent {
    pub fn from_payload(payload: &Value) -> Self {
        let kind = str_field(payload, "event").unwrap_or_default();
        match kind.as_str() {
            "message" | "agent_message" => UpstreamEvent::Chunk {
                // Whitespace-only pieces are part of the answer.
                answer: payload
                    .get("answer")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                conversation_id: str_field(payload, "conversation_id"),
                message_id: str_field(payload, "message_id"),
            },
            "message_end" => UpstreamEvent::End {
                message_id: str_field(payload, "message_id").or_else(|| str_field(payload, "id")),
                conversation_id: str_field(payload, "conversation_id"),
            },
            "error" => UpstreamEvent::Error {
                message: str_field(payload, "message").unwrap_or_else(|| "unknown error".into()),
                code: str_field(payload, "code"),
            },
            _ => UpstreamEvent::Other { kind },
        }
    }
}

/// A workflow stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    TextChunk(String),
    /// `node_started` / `node_finished`, kept verbatim for the caller.
    Node(Value),
    Finished(Value),
    Error(String),
    Exception(String),
    Other(String),
}

impl WorkflowEvent {
    pub fn from_payload(payload: &Value) -> Self {
        let kind = str_field(payload, "event").unwrap_or_default();
        match kind.as_str() {
            "text_chunk" => WorkflowEvent::TextChunk(
                payload
                    .pointer("/data/text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ),
            "node_started" | "node_finished" => WorkflowEvent::Node(payload.clone()),
            "workflow_finished" => {
                WorkflowEvent::Finished(payload.get("data").cloned().unwrap_or(Value::Null))
            }
            "error" => WorkflowEvent::Error(
                str_field(payload, "message").unwrap_or_else(|| "unknown".into()),
            ),
            _ => WorkflowEvent::Other(kind),
        }
    }
}

/// Reads a non-blank string field.
fn str_field(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}
