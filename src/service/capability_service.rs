use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::agent::types::{ResponseMode, WorkflowRunRequest, WorkflowRunResponse};
use crate::agent::WorkflowApi;
use crate::db::submission_repository::SubmissionRepository;
use crate::errors::AppError;
use crate::models::{Decision, Session, Submission, SubmissionStatus};

/// Capability submission approval flow. Approving a submission runs the
/// review workflow with the submission's fields as inputs.
#[derive(Clone)]
pub struct CapabilityService {
    repo: SubmissionRepository,
    workflow: Arc<dyn WorkflowApi>,
}

impl CapabilityService {
    pub fn new(repo: SubmissionRepository, workflow: Arc<dyn WorkflowApi>) -> Self {
        Self { repo, workflow }
    }

    /// Creates a pending submission from a loosely typed form payload.
    pub async fn create_submission(
        &self,
        payload: &Map<String, Value>,
        submitter: &Session,
    ) -> Submission {
        let text = |key: &str| payload.get(key).and_then(as_text);
        let list = |key: &str| payload.get(key).map(as_list).unwrap_or_default();

        let submission = Submission {
            company_name: text("companyName"),
            credit_code: text("creditCode"),
            company_scale: text("companyScale"),
            company_type: text("companyType"),
            company_address: text("companyAddress"),
            business_intro: text("businessIntro"),
            core_products: list("coreProducts"),
            intellectual_properties: list("intellectualProperties"),
            patents: list("patents"),
            contact_name: text("contactName"),
            contact_info: text("contactInfo"),
            submitted_by: Some(submitter.display_name.clone()),
            submitted_by_username: Some(submitter.username.clone()),
            status: Some(SubmissionStatus::Pending),
            created_at: Some(Utc::now()),
            ..Submission::default()
        };

        let saved = self.repo.insert(submission).await;
        info!(id = ?saved.id, username = %submitter.username, "Capability submission created");
        saved
    }

    pub async fn list_submissions(&self) -> Vec<Submission> {
        self.repo.find_all().await
    }

    pub async fn list_submissions_by_user(&self, username: &str) -> Vec<Submission> {
        self.repo.find_by_username(username).await
    }

    pub async fn get_submission(&self, id: &str) -> Result<Submission, AppError> {
        self.repo.find_by_id(id).await.ok_or_else(|| AppError::not_found("submission", id))
    }

    /// Records an admin decision. Only pending submissions can be decided, and
    /// a remark is mandatory. Approval triggers the review workflow.
    pub async fn decide(
        &self,
        id: &str,
        decision: Option<&str>,
        remark: &str,
        reviewer: &Session,
    ) -> Result<Submission, AppError> {
        if remark.trim().is_empty() {
            return Err(AppError::empty_field("remark"));
        }

        let existing = self.get_submission(id).await?;
        if !existing.is_pending() {
            return Err(AppError::AlreadyDecided { id: id.to_string() });
        }

        let decision = Decision::parse(decision).ok_or_else(|| AppError::InvalidField {
            field_name: "decision".to_string(),
            reason: "expected 'approve' or 'reject'".to_string(),
        })?;

        let updated = self
            .repo
            .update(id, |s| {
                // Re-checked under the store's write lock: a concurrent
                // decision may have landed since the read above.
                if !s.is_pending() {
                    return Err(AppError::AlreadyDecided { id: id.to_string() });
                }
                s.status = Some(decision.status());
                s.decision_remark = Some(remark.to_string());
                s.decision_reason = Some(remark.to_string());
                s.decision_by = Some(reviewer.username.clone());
                s.decision_by_name = Some(reviewer.display_name.clone());
                s.decision_at = Some(Utc::now());
                Ok(())
            })
            .await?;
        info!(id, ?decision, reviewer = %reviewer.username, "Submission decided");

        if decision != Decision::Approve {
            return Ok(updated);
        }

        let request = WorkflowRunRequest {
            inputs: build_workflow_inputs(&updated),
            response_mode: ResponseMode::Blocking,
            user: updated.submitted_by_username.clone().unwrap_or_default(),
        };
        let result = self.workflow.run_workflow(request).await.map_err(|e| {
            error!(id, "Workflow run after approval failed: {e}");
            AppError::WorkflowTriggerFailed { message: e.to_string() }
        })?;

        self.record_workflow_result(id, &result).await
    }

    async fn record_workflow_result(
        &self,
        id: &str,
        result: &WorkflowRunResponse,
    ) -> Result<Submission, AppError> {
        let response = serde_json::to_value(result).ok();
        self.repo
            .update(id, |s| {
                s.workflow_run_id = result.workflow_run_id.clone();
                s.workflow_task_id = result.task_id.clone();
                s.workflow_response = response;
                Ok(())
            })
            .await
    }
}

/// Workflow inputs for a submission; list fields are joined with `、`.
pub fn build_workflow_inputs(submission: &Submission) -> Map<String, Value> {
    let text = |v: &Option<String>| v.clone().map(Value::String).unwrap_or(Value::Null);
    let joined = |v: &[String]| Value::String(v.join("、"));

    let mut inputs = Map::new();
    inputs.insert("companyName".into(), text(&submission.company_name));
    inputs.insert("creditCode".into(), text(&submission.credit_code));
    inputs.insert("companyScale".into(), text(&submission.company_scale));
    inputs.insert("companyType".into(), text(&submission.company_type));
    inputs.insert("companyAddress".into(), text(&submission.company_address));
    inputs.insert("businessIntro".into(), text(&submission.business_intro));
    inputs.insert("coreProducts".into(), joined(&submission.core_products));
    inputs.insert("intellectualProperties".into(), joined(&submission.intellectual_properties));
    inputs.insert("patents".into(), joined(&submission.patents));
    inputs.insert("contactName".into(), text(&submission.contact_name));
    inputs.insert("contactInfo".into(), text(&submission.contact_info));
    inputs.insert("submittedBy".into(), text(&submission.submitted_by));
    inputs.insert("submittedByUsername".into(), text(&submission.submitted_by_username));
    inputs
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn as_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(as_text).collect(),
        other => as_text(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::agent::types::{
        WorkflowLogsQuery, WorkflowLogsResponse, WorkflowRunStatus, WorkflowStopResponse,
    };
    use crate::agent::WorkflowEventStream;
    use crate::models::Role;

    #[derive(Default)]
    struct RecordingWorkflow {
        fail: bool,
        runs: Mutex<Vec<WorkflowRunRequest>>,
    }

    #[async_trait]
    impl WorkflowApi for RecordingWorkflow {
        async fn run_workflow(
            &self,
            request: WorkflowRunRequest,
        ) -> Result<WorkflowRunResponse, AppError> {
            self.runs.lock().unwrap().push(request);
            if self.fail {
                return Err(AppError::UpstreamRejected { status: 400, message: "bad inputs".into() });
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
            Err(AppError::Unexpected("not scripted".into()))
        }

        async fn stop_workflow(
            &self,
            _task_id: &str,
            _user: &str,
        ) -> Result<WorkflowStopResponse, AppError> {
            Ok(WorkflowStopResponse::default())
        }

        async fn get_workflow_run(&self, _id: &str) -> Result<WorkflowRunStatus, AppError> {
            Ok(WorkflowRunStatus::default())
        }

        async fn get_workflow_logs(
            &self,
            _query: WorkflowLogsQuery,
        ) -> Result<WorkflowLogsResponse, AppError> {
            Ok(WorkflowLogsResponse::default())
        }
    }

    fn session(username: &str, role: Role) -> Session {
        Session {
            token: format!("{username}-token"),
            username: username.into(),
            role,
            display_name: format!("{username} display"),
            created_at: Utc::now(),
        }
    }

    async fn service(workflow: Arc<RecordingWorkflow>) -> (CapabilityService, TempDir) {
        let dir = tempdir().unwrap();
        let repo = SubmissionRepository::open(dir.path().join("submissions.json")).await;
        (CapabilityService::new(repo, workflow), dir)
    }

    fn payload() -> Map<String, Value> {
        json!({
            "companyName": "Acme",
            "companyScale": 120,
            "coreProducts": ["rockets", "anvils"],
            "patents": "P-1",
            "contactName": null
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[tokio::test]
    async fn create_normalizes_payload() {
        let (svc, _dir) = service(Arc::default()).await;
        let created = svc.create_submission(&payload(), &session("enterprise", Role::Enterprise)).await;

        assert_eq!(created.company_name.as_deref(), Some("Acme"));
        assert_eq!(created.company_scale.as_deref(), Some("120"));
        assert_eq!(created.core_products, vec!["rockets", "anvils"]);
        assert_eq!(created.patents, vec!["P-1"]);
        assert_eq!(created.contact_name, None);
        assert_eq!(created.status, Some(SubmissionStatus::Pending));
        assert_eq!(created.submitted_by.as_deref(), Some("enterprise display"));
    }

    #[tokio::test]
    async fn approval_runs_workflow_and_records_result() {
        let workflow = Arc::new(RecordingWorkflow::default());
        let (svc, _dir) = service(workflow.clone()).await;
        let created = svc.create_submission(&payload(), &session("enterprise", Role::Enterprise)).await;
        let id = created.id.unwrap();

        let decided =
            svc.decide(&id, Some("approve"), "looks good", &session("admin", Role::Admin)).await.unwrap();

        assert_eq!(decided.status, Some(SubmissionStatus::Approved));
        assert_eq!(decided.decision_reason.as_deref(), Some("looks good"));
        assert_eq!(decided.decision_by.as_deref(), Some("admin"));
        assert_eq!(decided.workflow_run_id.as_deref(), Some("run-1"));
        assert_eq!(decided.workflow_task_id.as_deref(), Some("task-1"));

        let runs = workflow.runs.lock().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].user, "enterprise");
        assert_eq!(runs[0].response_mode, ResponseMode::Blocking);
        assert_eq!(runs[0].inputs["coreProducts"], json!("rockets、anvils"));
    }

    #[tokio::test]
    async fn rejection_skips_workflow() {
        let workflow = Arc::new(RecordingWorkflow::default());
        let (svc, _dir) = service(workflow.clone()).await;
        let id = svc
            .create_submission(&payload(), &session("enterprise", Role::Enterprise))
            .await
            .id
            .unwrap();

        let decided =
            svc.decide(&id, Some("REJECT"), "incomplete", &session("admin", Role::Admin)).await.unwrap();
        assert_eq!(decided.status, Some(SubmissionStatus::Rejected));
        assert!(workflow.runs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn decisions_are_validated() {
        let (svc, _dir) = service(Arc::default()).await;
        let admin = session("admin", Role::Admin);
        let id = svc
            .create_submission(&payload(), &session("enterprise", Role::Enterprise))
            .await
            .id
            .unwrap();

        assert!(matches!(
            svc.decide(&id, Some("approve"), "  ", &admin).await,
            Err(AppError::EmptyField { .. })
        ));
        assert!(matches!(
            svc.decide(&id, Some("maybe"), "why", &admin).await,
            Err(AppError::InvalidField { .. })
        ));
        assert!(matches!(
            svc.decide("missing", Some("approve"), "why", &admin).await,
            Err(AppError::RecordNotFound { .. })
        ));

        svc.decide(&id, Some("reject"), "no", &admin).await.unwrap();
        assert!(matches!(
            svc.decide(&id, Some("approve"), "changed my mind", &admin).await,
            Err(AppError::AlreadyDecided { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_decisions_have_one_winner() {
        let (svc, _dir) = service(Arc::default()).await;
        for _ in 0..50 {
            let id = svc
                .create_submission(&payload(), &session("enterprise", Role::Enterprise))
                .await
                .id
                .unwrap();

            let approve = tokio::spawn({
                let (svc, id) = (svc.clone(), id.clone());
                async move {
                    svc.decide(&id, Some("approve"), "yes", &session("admin", Role::Admin)).await
                }
            });
            let reject = tokio::spawn({
                let (svc, id) = (svc.clone(), id.clone());
                async move {
                    svc.decide(&id, Some("reject"), "no", &session("admin", Role::Admin)).await
                }
            });
            let results = [approve.await.unwrap(), reject.await.unwrap()];

            let winners = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(winners, 1, "{results:?}");
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(AppError::AlreadyDecided { .. }))));
        }
    }

    #[tokio::test]
    async fn workflow_failure_is_reported_but_decision_sticks() {
        let workflow = Arc::new(RecordingWorkflow { fail: true, ..RecordingWorkflow::default() });
        let (svc, _dir) = service(workflow).await;
        let id = svc
            .create_submission(&payload(), &session("enterprise", Role::Enterprise))
            .await
            .id
            .unwrap();

        let err = svc.decide(&id, Some("approve"), "ok", &session("admin", Role::Admin)).await;
        assert!(matches!(err, Err(AppError::WorkflowTriggerFailed { .. })));
        assert_eq!(
            svc.get_submission(&id).await.unwrap().status,
            Some(SubmissionStatus::Approved)
        );
    }
}
