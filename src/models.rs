use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::types::{Conversation, WorkflowRunStatus};

// ── Chat ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message: Option<String>,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub success: bool,
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
    pub answer: String,
    pub mode: Option<String>,
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: Option<String>,
    #[serde(default = "default_page_limit")]
    pub limit: u32,
}

fn default_page_limit() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub success: bool,
    pub data: Vec<T>,
    pub has_more: bool,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    pub name: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameResponse {
    pub success: bool,
    pub conversation: Conversation,
}

// ── Workflow ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteWorkflowRequest {
    pub user_id: Option<String>,
    pub inputs: Option<Map<String, Value>>,
}

/// Result of a workflow run, blocking or aggregated from a stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum WorkflowExecution {
    #[serde(rename_all = "camelCase")]
    Blocking {
        workflow_run_id: Option<String>,
        task_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    Streaming { text: String, nodes: Vec<Value> },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopWorkflowRequest {
    pub task_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopWorkflowResponse {
    pub task_id: String,
    pub user_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunView {
    pub workflow_run_id: String,
    pub status: Option<String>,
    pub outputs: Option<Value>,
    pub raw: WorkflowRunStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowLogsParams {
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    10
}

// ── Auth ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Enterprise,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Enterprise => "ENTERPRISE",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub username: String,
    pub role: Role,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub token: String,
    pub username: String,
    pub role: Role,
    pub display_name: String,
}

impl From<Session> for SessionResponse {
    fn from(s: Session) -> Self {
        Self {
            success: true,
            token: s.token,
            username: s.username,
            role: s.role,
            display_name: s.display_name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

// ── Capability submissions ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

/// An enterprise's capability declaration awaiting (or past) review.
/// Every field is optional on disk so older or hand-edited files still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Submission {
    pub id: Option<String>,
    pub company_name: Option<String>,
    pub credit_code: Option<String>,
    pub company_scale: Option<String>,
    pub company_type: Option<String>,
    pub company_address: Option<String>,
    pub business_intro: Option<String>,
    pub core_products: Vec<String>,
    pub intellectual_properties: Vec<String>,
    pub patents: Vec<String>,
    pub contact_name: Option<String>,
    pub contact_info: Option<String>,
    pub submitted_by: Option<String>,
    pub submitted_by_username: Option<String>,
    pub status: Option<SubmissionStatus>,
    pub created_at: Option<DateTime<Utc>>,
    pub decision_at: Option<DateTime<Utc>>,
    pub decision_remark: Option<String>,
    pub decision_by: Option<String>,
    pub decision_by_name: Option<String>,
    pub decision_reason: Option<String>,
    pub workflow_run_id: Option<String>,
    pub workflow_task_id: Option<String>,
    pub workflow_response: Option<Value>,
}

impl Submission {
    pub fn is_pending(&self) -> bool {
        matches!(self.status, None | Some(SubmissionStatus::Pending))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionRequest {
    pub decision: Option<String>,
    #[serde(default)]
    pub remark: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            Some("approve") => Some(Decision::Approve),
            Some("reject") => Some(Decision::Reject),
            _ => None,
        }
    }

    pub fn status(self) -> SubmissionStatus {
        match self {
            Decision::Approve => SubmissionStatus::Approved,
            Decision::Reject => SubmissionStatus::Rejected,
        }
    }
}
