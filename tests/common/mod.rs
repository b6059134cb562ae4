#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};
use tower::ServiceExt;

use dify_relay::agent::events::{UpstreamEvent, WorkflowEvent};
use dify_relay::agent::types::{
    ChatMessage, ChatMessageResponse, Conversation, ConversationListResponse,
    MessageListResponse, WorkflowLogsQuery, WorkflowLogsResponse, WorkflowRunRequest,
    WorkflowRunResponse, WorkflowRunStatus, WorkflowStopResponse,
};
use dify_relay::agent::{ChatflowApi, EventStream, WorkflowApi, WorkflowEventStream};
use dify_relay::db::submission_repository::SubmissionRepository;
use dify_relay::errors::AppError;
use dify_relay::relay::{RelaySettings, StreamingRelay};
use dify_relay::routes::{build_router, AppState};
use dify_relay::service::auth_service::AuthService;
use dify_relay::service::capability_service::CapabilityService;
use dify_relay::service::chat_service::ChatService;
use dify_relay::service::workflow_service::WorkflowService;

/// In-process stand-in for the Dify API.
#[derive(Default)]
pub struct FakeDify {
    pub chat_events: Vec<UpstreamEvent>,
    pub workflow_events: Vec<WorkflowEvent>,
    pub workflow_fails: bool,
    pub chat_calls: Mutex<Vec<ChatMessage>>,
    pub workflow_runs: Mutex<Vec<WorkflowRunRequest>>,
}

#[async_trait]
impl ChatflowApi for FakeDify {
    async fn send_chat_message(
        &self,
        message: ChatMessage,
    ) -> Result<ChatMessageResponse, AppError> {
        let answer = format!("echo: {}", message.query);
        self.chat_calls.lock().unwrap().push(message);
        Ok(ChatMessageResponse {
            message_id: Some("msg-1".into()),
            conversation_id: Some("conv-1".into()),
            mode: Some("advanced-chat".into()),
            answer,
            metadata: None,
            created_at: Some(1_700_000_000),
        })
    }

    async fn send_chat_message_stream(&self, message: ChatMessage) -> Result<EventStream, AppError> {
        self.chat_calls.lock().unwrap().push(message);
        Ok(stream::iter(self.chat_events.clone()).boxed())
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        _user: &str,
        limit: u32,
    ) -> Result<MessageListResponse, AppError> {
        Ok(MessageListResponse {
            data: vec![json!({ "conversation_id": conversation_id, "answer": "hi" })],
            has_more: false,
            limit,
        })
    }

    async fn get_conversations(
        &self,
        _user: &str,
        limit: u32,
    ) -> Result<ConversationListResponse, AppError> {
        Ok(ConversationListResponse {
            data: vec![Conversation {
                id: "conv-1".into(),
                name: "First chat".into(),
                ..Conversation::default()
            }],
            has_more: true,
            limit,
        })
    }

    async fn delete_conversation(&self, _conversation_id: &str, _user: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        name: &str,
        _user: &str,
    ) -> Result<Conversation, AppError> {
        Ok(Conversation {
            id: conversation_id.into(),
            name: name.into(),
            ..Conversation::default()
        })
    }
}

#[async_trait]
impl WorkflowApi for FakeDify {
    async fn run_workflow(&self, request: WorkflowRunRequest) -> Result<WorkflowRunResponse, AppError> {
        self.workflow_runs.lock().unwrap().push(request);
        if self.workflow_fails {
            return Err(AppError::UpstreamRejected { status: 500, message: "workflow broke".into() });
        }
        Ok(WorkflowRunResponse {
            workflow_run_id: Some("run-1".into()),
            task_id: Some("task-1".into()),
            data: Some(json!({ "status": "succeeded" })),
        })
    }

    async fn run_workflow_stream(
        &self,
        _request: WorkflowRunRequest,
    ) -> Result<WorkflowEventStream, AppError> {
        Ok(stream::iter(self.workflow_events.clone()).boxed())
    }

    async fn stop_workflow(&self, _task_id: &str, _user: &str) -> Result<WorkflowStopResponse, AppError> {
        Ok(WorkflowStopResponse { result: Some("success".into()) })
    }

    async fn get_workflow_run(&self, workflow_run_id: &str) -> Result<WorkflowRunStatus, AppError> {
        Ok(WorkflowRunStatus {
            id: Some(workflow_run_id.into()),
            status: Some("succeeded".into()),
            outputs: Some(json!({ "text": "done" })),
            ..WorkflowRunStatus::default()
        })
    }

    async fn get_workflow_logs(&self, query: WorkflowLogsQuery) -> Result<WorkflowLogsResponse, AppError> {
        Ok(WorkflowLogsResponse {
            page: query.page,
            limit: query.limit,
            total: 1,
            has_more: false,
            data: vec![json!({ "id": "log-1" })],
        })
    }
}

pub async fn app_with(fake: Arc<FakeDify>, submissions_file: &Path) -> Router {
    let relay = StreamingRelay::new(
        fake.clone(),
        RelaySettings {
            wait_budget: Duration::from_secs(5),
            channel_timeout: Duration::from_secs(10),
        },
    );
    let repo = SubmissionRepository::open(submissions_file).await;
    let state = AppState {
        chat: ChatService::new(fake.clone(), relay),
        workflow: WorkflowService::new(fake.clone(), Duration::from_secs(5)),
        auth: AuthService::new(),
        capability: CapabilityService::new(repo, fake),
    };
    build_router(state, submissions_file.parent().unwrap_or(Path::new(".")))
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("X-Auth-Token", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("X-Auth-Token", token);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

pub async fn login(app: &Router, username: &str, password: &str) -> String {
    let response = send(
        app,
        json_request("POST", "/api/auth/login", None, json!({ "username": username, "password": password })),
    )
    .await;
    body_json(response).await["token"].as_str().unwrap().to_string()
}
