pub mod dify;
pub mod events;
pub mod sse;
pub mod types;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::errors::AppError;
use events::{UpstreamEvent, WorkflowEvent};
use types::{
    ChatMessage, ChatMessageResponse, Conversation, ConversationListResponse,
    MessageListResponse, WorkflowLogsQuery, WorkflowLogsResponse, WorkflowRunRequest,
    WorkflowRunResponse, WorkflowRunStatus, WorkflowStopResponse,
};

pub use dify::DifyClient;

/// Events of one streaming chat call. Dropping the stream releases the call.
pub type EventStream = BoxStream<'static, UpstreamEvent>;

/// Events of one streaming workflow run.
pub type WorkflowEventStream = BoxStream<'static, WorkflowEvent>;

/// The chatflow half of the Dify API.
#[async_trait]
pub trait ChatflowApi: Send + Sync {
    async fn send_chat_message(&self, message: ChatMessage)
        -> Result<ChatMessageResponse, AppError>;

    /// Opens a streaming call. Transport failures after the call is open are
    /// reported in-band as [`UpstreamEvent::Exception`].
    async fn send_chat_message_stream(&self, message: ChatMessage)
        -> Result<EventStream, AppError>;

    async fn get_messages(
        &self,
        conversation_id: &str,
        user: &str,
        limit: u32,
    ) -> Result<MessageListResponse, AppError>;

    async fn get_conversations(
        &self,
        user: &str,
        limit: u32,
    ) -> Result<ConversationListResponse, AppError>;

    async fn delete_conversation(&self, conversation_id: &str, user: &str)
        -> Result<(), AppError>;

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        name: &str,
        user: &str,
    ) -> Result<Conversation, AppError>;
}

/// The workflow half of the Dify API.
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    async fn run_workflow(&self, request: WorkflowRunRequest)
        -> Result<WorkflowRunResponse, AppError>;

    async fn run_workflow_stream(
        &self,
        request: WorkflowRunRequest,
    ) -> Result<WorkflowEventStream, AppError>;

    async fn stop_workflow(&self, task_id: &str, user: &str)
        -> Result<WorkflowStopResponse, AppError>;

    async fn get_workflow_run(&self, workflow_run_id: &str)
        -> Result<WorkflowRunStatus, AppError>;

    async fn get_workflow_logs(&self, query: WorkflowLogsQuery)
        -> Result<WorkflowLogsResponse, AppError>;
}
