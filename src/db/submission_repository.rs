use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::Submission;

/// Capability submissions held in memory and mirrored to a JSON file.
///
/// Disk failures are logged and never surface to callers: the in-memory copy
/// stays authoritative for the lifetime of the process.
#[derive(Clone)]
pub struct SubmissionRepository {
    path: PathBuf,
    submissions: Arc<RwLock<HashMap<String, Submission>>>,
}

impl SubmissionRepository {
    /// Opens the store, loading any records already on disk.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let loaded = load(&path).await;
        let submissions = loaded
            .into_iter()
            .filter_map(|s| s.id.clone().map(|id| (id, s)))
            .collect::<HashMap<_, _>>();
        Self { path, submissions: Arc::new(RwLock::new(submissions)) }
    }

    pub async fn insert(&self, submission: Submission) -> Submission {
        let mut submissions = self.submissions.write().await;
        let id = submission.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let submission = Submission { id: Some(id.clone()), ..submission };
        submissions.insert(id, submission.clone());
        self.persist(&submissions).await;
        submission
    }

    pub async fn find_by_id(&self, id: &str) -> Option<Submission> {
        self.submissions.read().await.get(id).cloned()
    }

    /// All submissions, newest first.
    pub async fn find_all(&self) -> Vec<Submission> {
        let submissions = self.submissions.read().await;
        newest_first(submissions.values().cloned().collect())
    }

    pub async fn find_by_username(&self, username: &str) -> Vec<Submission> {
        let submissions = self.submissions.read().await;
        newest_first(
            submissions
                .values()
                .filter(|s| s.submitted_by_username.as_deref() == Some(username))
                .cloned()
                .collect(),
        )
    }

    /// Applies `change` to the stored record under the write lock and
    /// persists. A `change` that returns an error must leave the record
    /// untouched; nothing is written in that case.
    pub async fn update(
        &self,
        id: &str,
        change: impl FnOnce(&mut Submission) -> Result<(), AppError>,
    ) -> Result<Submission, AppError> {
        let mut submissions = self.submissions.write().await;
        let submission =
            submissions.get_mut(id).ok_or_else(|| AppError::not_found("submission", id))?;
        change(submission)?;
        let updated = submission.clone();
        self.persist(&submissions).await;
        Ok(updated)
    }

    async fn persist(&self, submissions: &HashMap<String, Submission>) {
        let records = newest_first(submissions.values().cloned().collect());
        if let Err(e) = write_json(&self.path, &records).await {
            warn!(path = %self.path.display(), "Failed to persist submissions: {e}");
        }
    }
}

async fn load(path: &Path) -> Vec<Submission> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(path = %parent.display(), "Failed to create data directory: {e}");
        }
    }

    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            error!(path = %path.display(), "Failed to read submissions: {e}");
            return Vec::new();
        }
    };

    let mut stored: Vec<Submission> = match serde_json::from_slice(&bytes) {
        Ok(stored) => stored,
        Err(e) => {
            error!(path = %path.display(), "Failed to parse submissions: {e}");
            return Vec::new();
        }
    };

    for item in &mut stored {
        if item.id.is_none() {
            item.id = Some(Uuid::new_v4().to_string());
        }
        if item.created_at.is_none() {
            item.created_at = Some(Utc::now());
        }
        if item.decision_reason.is_none() {
            item.decision_reason = item.decision_remark.clone();
        }
    }
    info!(count = stored.len(), "Loaded capability submissions from disk");
    stored
}

async fn write_json(path: &Path, records: &[Submission]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(records)?;
    tokio::fs::write(path, json).await
}

fn newest_first(mut records: Vec<Submission>) -> Vec<Submission> {
    // Records without a timestamp sort last.
    records.sort_by(|a, b| match (a.created_at, b.created_at) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    records
}
