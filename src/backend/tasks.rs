//! Bulk assignment task API client.
//!
//! This module provides functionality to:
//! - Start a bulk care-team assignment task for a set of patients
//! - Poll the task for per-patient progress and results
//!
//! # Security
//!
//! - Patient names and notes are never logged
//! - Auth headers and tokens are never logged
//! - Task ids are redacted to their first 8 characters

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::client::{redact_id, ApiClient};
use crate::error::AppError;

/// Path of the bulk assignment collection endpoint.
const BULK_ASSIGN_PATH: &str = "/api/patients/bulk-assign";

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Backend-reported state of a bulk task.
///
/// IMPORTANT: Uses `#[serde(rename_all = "lowercase")]` to match the backend,
/// which sends "processing" and "completed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Items are still being processed.
    Processing,
    /// Every item has a result; no further progress will be reported.
    Completed,
}

impl TaskStatus {
    /// Returns true if the task cannot transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

/// Per-patient outcome as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    #[serde(alias = "skipped")]
    Skip,
    Error,
}

/// Result for a single target of a bulk task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    /// Target (patient) id. Empty for a synthetic submission failure.
    #[serde(rename = "patient_id", default)]
    pub target_id: String,
    /// Target display name. Empty for a synthetic submission failure.
    #[serde(rename = "patient_name", default)]
    pub target_name: String,
    #[serde(rename = "status")]
    pub outcome: Outcome,
    /// Number of assignees actually added to the target.
    #[serde(default)]
    pub invited: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemResult {
    /// Builds the single result reported when the task could not be started.
    pub fn submission_failure(message: impl Into<String>) -> Self {
        Self {
            target_id: String::new(),
            target_name: String::new(),
            outcome: Outcome::Error,
            invited: 0,
            note: None,
            error: Some(message.into()),
        }
    }
}

/// Request body for starting a bulk assignment.
#[derive(Debug, Clone, Serialize)]
pub struct StartBulkAssignRequest<'a> {
    #[serde(rename = "patient_ids")]
    pub target_ids: &'a [String],
    #[serde(rename = "member_ids")]
    pub assignee_ids: &'a [String],
}

/// Response returned when a task was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkAssignStarted {
    pub task_id: String,
    pub total: u64,
}

/// Snapshot of a task's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkAssignProgress {
    pub status: TaskStatus,
    pub total: u64,
    pub completed: u64,
    #[serde(default)]
    pub results: Vec<ItemResult>,
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkAssignClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the backend's bulk assignment task endpoints.
#[derive(Clone, Debug)]
pub struct BulkAssignClient {
    api: ApiClient,
}

impl BulkAssignClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Starts a bulk assignment task.
    ///
    /// The caller guarantees both lists are non-empty; the backend rejects
    /// empty lists with a validation error.
    ///
    /// # Errors
    ///
    /// - `AppError::ApiError` - Validation or server error
    /// - `AppError::RateLimited` - Rate limit exceeded
    /// - `AppError::ConnectionFailed` - Network error
    pub async fn start_bulk_assign(
        &self,
        target_ids: &[String],
        assignee_ids: &[String],
    ) -> Result<BulkAssignStarted, AppError> {
        info!(
            "[BULK-ASSIGN] POST {} ({} patients, {} members)",
            BULK_ASSIGN_PATH,
            target_ids.len(),
            assignee_ids.len()
        );

        let body = StartBulkAssignRequest {
            target_ids,
            assignee_ids,
        };
        let started: BulkAssignStarted = self.api.post_json(BULK_ASSIGN_PATH, &body).await?;

        info!(
            "[BULK-ASSIGN] Task {} accepted with {} items",
            redact_id(&started.task_id),
            started.total
        );

        Ok(started)
    }

    /// Fetches the current progress of a task.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` - Unknown task id
    /// - `AppError::ConnectionFailed` - Network error
    /// - `AppError::InvalidResponse` - Body did not match the progress shape
    pub async fn get_bulk_assign_progress(
        &self,
        task_id: &str,
    ) -> Result<BulkAssignProgress, AppError> {
        self.api.get_json(&task_path(task_id)).await
    }
}

/// Builds `/api/patients/bulk-assign/{task_id}` with the id percent-encoded.
fn task_path(task_id: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(task_id.as_bytes()).collect();
    format!("{}/{}", BULK_ASSIGN_PATH, encoded)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
