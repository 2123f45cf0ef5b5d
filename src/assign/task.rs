//! Client-side view of a running bulk assignment task.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use crate::backend::{BulkAssignProgress, BulkAssignStarted, ItemResult, TaskStatus};

/// Reasons a progress response is refused instead of applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressRejected {
    #[error("patient {0} appears more than once in results")]
    DuplicateTarget(String),

    #[error("{results} results reported for a task of {total} items")]
    TooManyResults { results: usize, total: u64 },

    #[error("completed count went backwards from {previous} to {reported}")]
    CompletedRegressed { previous: u64, reported: u64 },
}

/// A bulk task as last reported by the backend.
///
/// Created on a successful submission and overwritten wholesale by each
/// accepted progress response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkTask {
    pub id: String,
    /// Targets submitted with the task, in submission order.
    pub target_ids: Vec<String>,
    pub total: u64,
    pub completed: u64,
    pub status: TaskStatus,
    pub results: Vec<ItemResult>,
    /// Set when polling gave up before the backend reported completion.
    pub timed_out: bool,
}

impl BulkTask {
    /// Establishes the progress baseline for a freshly started task.
    ///
    /// `total` is the number of submitted targets.
    pub fn started(started: BulkAssignStarted, target_ids: Vec<String>) -> Self {
        Self {
            id: started.task_id,
            total: target_ids.len() as u64,
            target_ids,
            completed: 0,
            status: TaskStatus::Processing,
            results: Vec::new(),
            timed_out: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Overwrites local progress with a backend response.
    ///
    /// The response replaces `completed`, `total`, `results` and `status`.
    /// Responses that would break the task invariants are refused and leave
    /// the task untouched.
    pub fn apply(&mut self, progress: BulkAssignProgress) -> Result<(), ProgressRejected> {
        if progress.results.len() as u64 > progress.total {
            return Err(ProgressRejected::TooManyResults {
                results: progress.results.len(),
                total: progress.total,
            });
        }

        let mut seen = HashSet::with_capacity(progress.results.len());
        for item in &progress.results {
            if !seen.insert(item.target_id.as_str()) {
                return Err(ProgressRejected::DuplicateTarget(item.target_id.clone()));
            }
        }

        if progress.completed < self.completed {
            return Err(ProgressRejected::CompletedRegressed {
                previous: self.completed,
                reported: progress.completed,
            });
        }

        self.completed = progress.completed;
        self.total = progress.total;
        self.results = progress.results;
        self.status = progress.status;
        Ok(())
    }

    /// Marks the task completed while keeping the last accepted results.
    ///
    /// Used when the backend reports completion with a payload that
    /// `apply` refused.
    pub fn complete_with_last_known(&mut self) {
        self.status = TaskStatus::Completed;
    }

    /// Submitted targets that have no result yet, in submission order.
    pub fn pending_targets(&self) -> Vec<&str> {
        let done: HashSet<&str> = self.results.iter().map(|r| r.target_id.as_str()).collect();
        self.target_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !done.contains(id))
            .collect()
    }
}
