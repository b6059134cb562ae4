use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::agent::events::WorkflowEvent;
use crate::agent::types::{ResponseMode, WorkflowLogsQuery, WorkflowLogsResponse, WorkflowRunRequest};
use crate::agent::{WorkflowApi, WorkflowEventStream};
use crate::errors::AppError;
use crate::models::{StopWorkflowResponse, WorkflowExecution, WorkflowRunView};

#[derive(Clone)]
pub struct WorkflowService {
    client: Arc<dyn WorkflowApi>,
    stream_wait: Duration,
}

impl WorkflowService {
    pub fn new(client: Arc<dyn WorkflowApi>, stream_wait: Duration) -> Self {
        Self { client, stream_wait }
    }

    pub async fn execute_blocking(
        &self,
        inputs: Map<String, Value>,
        user_id: &str,
    ) -> Result<WorkflowExecution, AppError> {
        info!(user_id, inputs = ?inputs.keys().collect::<Vec<_>>(), "Running workflow (blocking)");
        let response = self
            .client
            .run_workflow(WorkflowRunRequest {
                inputs,
                response_mode: ResponseMode::Blocking,
                user: user_id.to_string(),
            })
            .await?;

        Ok(WorkflowExecution::Blocking {
            workflow_run_id: response.workflow_run_id,
            task_id: response.task_id,
            data: response.data,
        })
    }

    /// Runs the workflow in streaming mode and aggregates the result: text
    /// chunks are concatenated and node events collected. Running out of time
    /// is only an error when no text arrived at all.
    pub async fn execute_streaming(
        &self,
        inputs: Map<String, Value>,
        user_id: &str,
    ) -> Result<WorkflowExecution, AppError> {
        info!(user_id, inputs = ?inputs.keys().collect::<Vec<_>>(), "Running workflow (streaming)");
        let mut events = self
            .client
            .run_workflow_stream(WorkflowRunRequest {
                inputs,
                response_mode: ResponseMode::Streaming,
                user: user_id.to_string(),
            })
            .await?;

        let mut text = String::new();
        let mut nodes = Vec::new();
        let outcome =
            tokio::time::timeout(self.stream_wait, collect(&mut events, &mut text, &mut nodes))
                .await;

        match outcome {
            Ok(Err(e)) => {
                error!(user_id, "Streaming workflow failed: {e}");
                return Err(e);
            }
            Err(_) if text.is_empty() => {
                error!(user_id, "Streaming workflow timed out without output");
                return Err(AppError::StreamTimedOut);
            }
            Err(_) => warn!(user_id, "Streaming workflow timed out, returning partial text"),
            Ok(Ok(())) => {}
        }

        Ok(WorkflowExecution::Streaming { text, nodes })
    }

    pub async fn stop(&self, task_id: &str, user_id: &str) -> Result<StopWorkflowResponse, AppError> {
        let response = self.client.stop_workflow(task_id, user_id).await?;
        info!(task_id, user_id, result = ?response.result, "Workflow stop requested");
        Ok(StopWorkflowResponse {
            task_id: task_id.to_string(),
            user_id: user_id.to_string(),
            status: "stopped".to_string(),
        })
    }

    pub async fn get_run(&self, workflow_run_id: &str) -> Result<WorkflowRunView, AppError> {
        let status = self.client.get_workflow_run(workflow_run_id).await?;
        Ok(WorkflowRunView {
            workflow_run_id: workflow_run_id.to_string(),
            status: status.status.clone(),
            outputs: status.outputs.clone(),
            raw: status,
        })
    }

    pub async fn get_logs(&self, query: WorkflowLogsQuery) -> Result<WorkflowLogsResponse, AppError> {
        self.client.get_workflow_logs(query).await
    }
}

async fn collect(
    events: &mut WorkflowEventStream,
    text: &mut String,
    nodes: &mut Vec<Value>,
) -> Result<(), AppError> {
    while let Some(event) = events.next().await {
        match event {
            WorkflowEvent::TextChunk(chunk) => text.push_str(&chunk),
            WorkflowEvent::Node(node) => nodes.push(node),
            WorkflowEvent::Finished(data) => {
                debug!(?data, "Workflow finished");
                return Ok(());
            }
            WorkflowEvent::Error(message) => {
                return Err(AppError::StreamFailed { message: format!("stream error: {message}") });
            }
            WorkflowEvent::Exception(cause) => {
                return Err(AppError::StreamFailed { message: format!("stream exception: {cause}") });
            }
            WorkflowEvent::Other(kind) => debug!(kind = %kind, "Ignoring workflow event"),
        }
    }
    Ok(())
}
