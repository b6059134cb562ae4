use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::agent::types::WorkflowLogsQuery;
use crate::errors::AppError;
use crate::models::{ExecuteWorkflowRequest, StopWorkflowRequest, WorkflowLogsParams};
use crate::routes::{required, Success};
use crate::service::workflow_service::WorkflowService;

/// POST `/api/workflow/execute`
pub async fn execute_handler(
    State(svc): State<WorkflowService>,
    Json(req): Json<ExecuteWorkflowRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = required(req.user_id, "userId")?;
    let inputs = req.inputs.ok_or_else(|| AppError::empty_field("inputs"))?;
    Ok(Success::new(svc.execute_blocking(inputs, &user_id).await?))
}

/// POST `/api/workflow/execute-stream` — aggregates the streamed run into one response
pub async fn execute_stream_handler(
    State(svc): State<WorkflowService>,
    Json(req): Json<ExecuteWorkflowRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = required(req.user_id, "userId")?;
    let inputs = req.inputs.ok_or_else(|| AppError::empty_field("inputs"))?;
    Ok(Success::new(svc.execute_streaming(inputs, &user_id).await?))
}

/// POST `/api/workflow/stop`
pub async fn stop_handler(
    State(svc): State<WorkflowService>,
    Json(req): Json<StopWorkflowRequest>,
) -> Result<impl IntoResponse, AppError> {
    let task_id = required(req.task_id, "taskId")?;
    let user_id = required(req.user_id, "userId")?;
    Ok(Success::new(svc.stop(&task_id, &user_id).await?))
}

/// GET `/api/workflow/runs/{workflow_run_id}`
pub async fn run_handler(
    Path(workflow_run_id): Path<String>,
    State(svc): State<WorkflowService>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Success::new(svc.get_run(&workflow_run_id).await?))
}

/// GET `/api/workflow/logs?start=&end=&page=&pageSize=`
pub async fn logs_handler(
    Query(params): Query<WorkflowLogsParams>,
    State(svc): State<WorkflowService>,
) -> Result<impl IntoResponse, AppError> {
    let logs = svc
        .get_logs(WorkflowLogsQuery {
            start: params.start,
            end: params.end,
            page: params.page,
            limit: params.page_size,
        })
        .await?;
    Ok(Success::new(logs))
}
