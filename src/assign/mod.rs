//! Bulk care-team assignment orchestration.
//!
//! A bulk assignment runs through three stages owned by [`BulkAssignDialog`]:
//! selection of patients and members, an in-progress stage driven by a
//! fixed-cadence poller, and a result stage summarized by the aggregator.
//!
//! The backend collaborators are reached through [`TaskOps`] and
//! [`DirectoryOps`] so the orchestration can be exercised with fakes.

pub mod aggregator;
pub mod dialog;
pub mod poller;
pub mod selection;
pub mod submitter;
pub mod task;

use std::future::Future;
use std::pin::Pin;

use crate::backend::{
    AssignableUser, BulkAssignClient, BulkAssignProgress, BulkAssignStarted, DirectoryClient,
};
use crate::error::AppError;

pub use aggregator::{classify, summarize, Bucket, ResultSummary};
pub use dialog::{BulkAssignDialog, DialogSnapshot, Phase};
pub use poller::{PollControl, PollEvent, PollHandle};
pub use selection::{SelectionState, Submission, TargetRef};
pub use submitter::SubmitOutcome;
pub use task::{BulkTask, ProgressRejected};

// ─────────────────────────────────────────────────────────────────────────────
// Traits for Testing
// ─────────────────────────────────────────────────────────────────────────────

/// Task-execution operations, allowing test fakes.
pub trait TaskOps: Send + Sync + Clone + 'static {
    /// Starts a bulk assignment task.
    fn start_bulk_assign<'a>(
        &'a self,
        target_ids: &'a [String],
        assignee_ids: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<BulkAssignStarted, AppError>> + Send + 'a>>;

    /// Fetches the current progress of a task.
    fn get_bulk_assign_progress<'a>(
        &'a self,
        task_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<BulkAssignProgress, AppError>> + Send + 'a>>;
}

impl TaskOps for BulkAssignClient {
    fn start_bulk_assign<'a>(
        &'a self,
        target_ids: &'a [String],
        assignee_ids: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<BulkAssignStarted, AppError>> + Send + 'a>> {
        Box::pin(BulkAssignClient::start_bulk_assign(
            self,
            target_ids,
            assignee_ids,
        ))
    }

    fn get_bulk_assign_progress<'a>(
        &'a self,
        task_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<BulkAssignProgress, AppError>> + Send + 'a>> {
        Box::pin(BulkAssignClient::get_bulk_assign_progress(self, task_id))
    }
}

/// User directory operations, allowing test fakes.
pub trait DirectoryOps: Send + Sync + 'static {
    fn list_assignable_users(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AssignableUser>, AppError>> + Send + '_>>;
}

impl DirectoryOps for DirectoryClient {
    fn list_assignable_users(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AssignableUser>, AppError>> + Send + '_>> {
        Box::pin(DirectoryClient::list_assignable_users(self))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Progress Sink
// ─────────────────────────────────────────────────────────────────────────────

/// Receives a snapshot every time the dialog state changes.
///
/// The desktop shell forwards these to the frontend as events.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, snapshot: &DialogSnapshot);
}
