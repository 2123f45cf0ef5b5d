//! Task submission: one start call, then either a baseline or a terminal failure.

use tracing::{info, warn};

use crate::assign::{BulkTask, Submission, TaskOps};
use crate::backend::client::redact_id;
use crate::backend::ItemResult;

/// What a submission attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The backend accepted the task; polling should start.
    Started(BulkTask),
    /// The start call failed. The single synthetic result is the whole outcome.
    Failed(ItemResult),
}

/// Issues the start call for a validated submission.
///
/// Submission failures are never retried.
pub async fn submit<T: TaskOps>(tasks: &T, submission: &Submission) -> SubmitOutcome {
    match tasks
        .start_bulk_assign(submission.target_ids(), submission.assignee_ids())
        .await
    {
        Ok(started) => {
            let submitted = submission.target_ids().len() as u64;
            if started.total != submitted {
                warn!(
                    "[BULK-ASSIGN] Task {} reported {} items for {} submitted patients",
                    redact_id(&started.task_id),
                    started.total,
                    submitted
                );
            }
            info!(
                "[BULK-ASSIGN] Task {} started",
                redact_id(&started.task_id)
            );
            SubmitOutcome::Started(BulkTask::started(
                started,
                submission.target_ids().to_vec(),
            ))
        }
        Err(e) => {
            warn!("[BULK-ASSIGN] Failed to start task: {}", e);
            SubmitOutcome::Failed(ItemResult::submission_failure(e.describe()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::selection::{SelectionState, TargetRef};
    use crate::backend::{AssignableUser, BulkAssignProgress, BulkAssignStarted, Outcome};
    use crate::error::AppError;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct RecordingTasks {
        fail: bool,
        calls: Arc<Mutex<Vec<(Vec<String>, Vec<String>)>>>,
    }

    impl TaskOps for RecordingTasks {
        fn start_bulk_assign<'a>(
            &'a self,
            target_ids: &'a [String],
            assignee_ids: &'a [String],
        ) -> Pin<Box<dyn Future<Output = Result<BulkAssignStarted, AppError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push((target_ids.to_vec(), assignee_ids.to_vec()));
                if self.fail {
                    Err(AppError::ConnectionFailed("network unreachable".into()))
                } else {
                    Ok(BulkAssignStarted {
                        task_id: "t1".to_string(),
                        total: target_ids.len() as u64,
                    })
                }
            })
        }

        fn get_bulk_assign_progress<'a>(
            &'a self,
            _task_id: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<BulkAssignProgress, AppError>> + Send + 'a>>
        {
            Box::pin(async { Err(AppError::Internal("not used".into())) })
        }
    }

    fn submission() -> Submission {
        let targets = ["p1", "p2", "p3"]
            .iter()
            .map(|id| TargetRef {
                id: id.to_string(),
                name: id.to_string(),
                channel_id: Some("C".to_string()),
            })
            .collect();
        let mut selection = SelectionState::new(
            targets,
            vec![AssignableUser {
                id: "u1".to_string(),
                name: "Member".to_string(),
                display_name: String::new(),
                email: String::new(),
            }],
        );
        selection.toggle("u1");
        selection.submission().unwrap()
    }

    #[tokio::test]
    async fn success_establishes_baseline() {
        let tasks = RecordingTasks {
            fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        };

        let outcome = submit(&tasks, &submission()).await;

        match outcome {
            SubmitOutcome::Started(task) => {
                assert_eq!(task.id, "t1");
                assert_eq!(task.total, 3);
                assert_eq!(task.completed, 0);
                assert!(task.results.is_empty());
            }
            other => panic!("expected Started, got {:?}", other),
        }

        let calls = tasks.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn failure_synthesizes_single_error_item() {
        let tasks = RecordingTasks {
            fail: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        };

        let outcome = submit(&tasks, &submission()).await;

        match outcome {
            SubmitOutcome::Failed(item) => {
                assert_eq!(item.outcome, Outcome::Error);
                assert!(item.target_id.is_empty());
                assert!(item.target_name.is_empty());
                assert!(item.error.unwrap().contains("network unreachable"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(tasks.calls.lock().unwrap().len(), 1, "no retry on failure");
    }
}
