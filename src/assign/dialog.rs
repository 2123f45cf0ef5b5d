//! Lifecycle controller for the bulk assignment dialog.
//!
//! States move `select` → `progress` → `result`. The only way back to
//! `select` is a full reset, which is refused while a task is in progress.
//!
//! All mutable state lives behind one `std::sync::Mutex` that is never held
//! across an `.await`. Every reset bumps a generation counter; submission and
//! poll responses carry the generation they were issued under and are dropped
//! when it no longer matches.
//!
//! The poll timer is held as an `Option<PollHandle>`. Every exit path takes
//! the handle out of the slot before releasing it, so it is released once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assign::poller::{self, PollControl, PollEvent, PollHandle};
use crate::assign::submitter::{self, SubmitOutcome};
use crate::assign::{
    summarize, BulkTask, DirectoryOps, ProgressSink, ResultSummary, SelectionState, TargetRef,
    TaskOps,
};
use crate::backend::client::redact_id;
use crate::backend::{AssignableUser, ItemResult};
use crate::config::PollConfig;

/// Dialog stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Select,
    Progress,
    Result,
}

#[derive(Debug)]
struct DialogState {
    phase: Phase,
    generation: u64,
    selection: SelectionState,
    submitting: bool,
    task: Option<BulkTask>,
    /// Set when the start call itself failed.
    failure: Option<SubmitFailure>,
    poll: Option<PollHandle>,
}

/// A failed start call: the synthetic result and how many patients were
/// submitted.
#[derive(Debug)]
struct SubmitFailure {
    item: ItemResult,
    total: u64,
}

impl DialogState {
    fn new(selection: SelectionState) -> Self {
        Self {
            phase: Phase::Select,
            generation: 0,
            selection,
            submitting: false,
            task: None,
            failure: None,
            poll: None,
        }
    }

    fn release_poll(&mut self) {
        if let Some(handle) = self.poll.take() {
            handle.release();
        }
    }

    /// Results as the aggregator sees them.
    fn results(&self) -> Vec<ItemResult> {
        match (&self.failure, &self.task) {
            (Some(failure), _) => vec![failure.item.clone()],
            (None, Some(task)) => task.results.clone(),
            (None, None) => Vec::new(),
        }
    }

    fn snapshot(&self) -> DialogSnapshot {
        let results = self.results();
        let task = self.task.as_ref();

        DialogSnapshot {
            generation: self.generation,
            phase: self.phase,
            submitting: self.submitting,
            task_id: task.map(|t| t.id.clone()),
            total: match (task, &self.failure) {
                (Some(task), _) => task.total,
                (None, Some(failure)) => failure.total,
                (None, None) => 0,
            },
            completed: task.map(|t| t.completed).unwrap_or(0),
            pending: task
                .map(|t| t.pending_targets().into_iter().map(str::to_string).collect())
                .unwrap_or_default(),
            summary: summarize(&results),
            warnings: self.selection.linkage_warnings().into_iter().cloned().collect(),
            selected_assignees: self.selection.selected_ids().to_vec(),
            can_submit: self.phase == Phase::Select
                && !self.submitting
                && self.selection.can_submit(),
            timed_out: task.is_some_and(|t| t.timed_out),
        }
    }
}

/// Read-only view of the dialog, handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogSnapshot {
    pub generation: u64,
    pub phase: Phase,
    pub submitting: bool,
    pub task_id: Option<String>,
    pub total: u64,
    pub completed: u64,
    /// Submitted patients without a result yet.
    pub pending: Vec<String>,
    pub summary: ResultSummary,
    /// Patients without a channel; the backend will skip them.
    pub warnings: Vec<TargetRef>,
    pub selected_assignees: Vec<String>,
    pub can_submit: bool,
    pub timed_out: bool,
}

/// Bulk assignment dialog: selection, in-progress polling and result summary.
pub struct BulkAssignDialog<T: TaskOps, D: DirectoryOps> {
    tasks: T,
    directory: D,
    poll_config: PollConfig,
    sink: Option<Arc<dyn ProgressSink>>,
    shared: Arc<Mutex<DialogState>>,
}

fn lock(shared: &Mutex<DialogState>) -> MutexGuard<'_, DialogState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: TaskOps, D: DirectoryOps> BulkAssignDialog<T, D> {
    /// Opens the dialog for `targets`, loading member candidates.
    pub async fn open(tasks: T, directory: D, poll_config: PollConfig, targets: Vec<TargetRef>) -> Self {
        let selection = SelectionState::load(targets, &directory).await;

        Self {
            tasks,
            directory,
            poll_config,
            sink: None,
            shared: Arc::new(Mutex::new(DialogState::new(selection))),
        }
    }

    /// Routes state changes to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn state(&self) -> MutexGuard<'_, DialogState> {
        lock(&self.shared)
    }

    fn emit(&self, snapshot: DialogSnapshot) {
        if let Some(sink) = &self.sink {
            sink.emit(&snapshot);
        }
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    pub fn snapshot(&self) -> DialogSnapshot {
        self.state().snapshot()
    }

    /// Task as last reported, if one was started in this generation.
    pub fn task(&self) -> Option<BulkTask> {
        self.state().task.clone()
    }

    pub fn results(&self) -> Vec<ItemResult> {
        self.state().results()
    }

    pub fn summary(&self) -> ResultSummary {
        summarize(&self.state().results())
    }

    pub fn warnings(&self) -> Vec<TargetRef> {
        self.state()
            .selection
            .linkage_warnings()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn can_submit(&self) -> bool {
        let state = self.state();
        state.phase == Phase::Select && !state.submitting && state.selection.can_submit()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies `edit` to the selection while the dialog is in `select`.
    fn edit_selection<R>(&self, edit: impl FnOnce(&mut SelectionState) -> R) -> Option<R> {
        let (result, snapshot) = {
            let mut state = self.state();
            if state.phase != Phase::Select || state.submitting {
                return None;
            }
            let result = edit(&mut state.selection);
            (result, state.snapshot())
        };
        self.emit(snapshot);
        Some(result)
    }

    pub fn set_query(&self, query: &str) {
        self.edit_selection(|s| s.set_query(query));
    }

    /// Candidates matching the current filter.
    pub fn visible_candidates(&self) -> Vec<AssignableUser> {
        self.state()
            .selection
            .visible_candidates()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Toggles a member. Returns whether it is selected afterwards; outside
    /// `select` nothing changes and the current membership is returned.
    pub fn toggle_assignee(&self, user_id: &str) -> bool {
        match self.edit_selection(|s| s.toggle(user_id)) {
            Some(selected) => selected,
            None => self.state().selection.is_selected(user_id),
        }
    }

    pub fn select_visible(&self) {
        self.edit_selection(SelectionState::select_visible);
    }

    pub fn clear_assignees(&self) {
        self.edit_selection(SelectionState::clear_selected);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submission and polling
    // ─────────────────────────────────────────────────────────────────────────

    /// Submits the current selection.
    ///
    /// Returns the phase reached, or `None` when the submission was refused
    /// (guard not satisfied, not in `select`, another submit in flight) or its
    /// response arrived after a reset.
    pub async fn submit(&self) -> Option<Phase> {
        let (generation, submission, snapshot) = {
            let mut state = self.state();
            if state.phase != Phase::Select || state.submitting {
                debug!("[BULK-ASSIGN] Submit ignored in {:?}", state.phase);
                return None;
            }
            let submission = state.selection.submission()?;
            state.submitting = true;
            (state.generation, submission, state.snapshot())
        };
        self.emit(snapshot);

        info!(
            "[BULK-ASSIGN] Submitting {} patients with {} members",
            submission.target_ids().len(),
            submission.assignee_ids().len()
        );

        let outcome = submitter::submit(&self.tasks, &submission).await;

        let (phase, snapshot) = {
            let mut state = self.state();
            if state.generation != generation {
                info!("[BULK-ASSIGN] Discarding submit response from a closed dialog");
                return None;
            }
            state.submitting = false;

            match outcome {
                SubmitOutcome::Started(task) => {
                    let handle = self.spawn_poller(generation, task.id.clone());
                    state.task = Some(task);
                    state.phase = Phase::Progress;
                    state.release_poll();
                    state.poll = Some(handle);
                }
                SubmitOutcome::Failed(item) => {
                    state.failure = Some(SubmitFailure {
                        item,
                        total: submission.target_ids().len() as u64,
                    });
                    state.phase = Phase::Result;
                }
            }
            (state.phase, state.snapshot())
        };
        self.emit(snapshot);

        Some(phase)
    }

    fn spawn_poller(&self, generation: u64, task_id: String) -> PollHandle {
        let shared = Arc::clone(&self.shared);
        let sink = self.sink.clone();
        let watched = task_id.clone();

        poller::spawn(
            self.tasks.clone(),
            task_id,
            self.poll_config,
            move |event| {
                let (control, snapshot) = {
                    let mut state = lock(&shared);
                    let (control, changed) = on_poll_event(&mut state, generation, &watched, event);
                    (control, changed.then(|| state.snapshot()))
                };

                if let (Some(sink), Some(snapshot)) = (&sink, snapshot) {
                    sink.emit(&snapshot);
                }
                control
            },
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Close / reset
    // ─────────────────────────────────────────────────────────────────────────

    /// Closes the dialog.
    ///
    /// While a task is in progress this does nothing and returns `false`: the
    /// task keeps running and the dialog keeps polling. Otherwise the dialog
    /// is reset.
    pub fn close(&self) -> bool {
        if self.phase() == Phase::Progress {
            info!("[BULK-ASSIGN] Close ignored while task is in progress");
            return false;
        }
        self.reset()
    }

    /// Returns the dialog to `select` with an empty member choice.
    ///
    /// Refused while in `progress`.
    pub fn reset(&self) -> bool {
        let snapshot = {
            let mut state = self.state();
            if state.phase == Phase::Progress {
                return false;
            }
            reset_state(&mut state, None);
            state.snapshot()
        };
        self.emit(snapshot);
        true
    }

    /// Resets the dialog onto a new set of patients and reloads candidates.
    ///
    /// Refused while in `progress`, or if another reset happened while the
    /// candidates were loading.
    pub async fn reopen(&self, targets: Vec<TargetRef>) -> bool {
        let generation = {
            let state = self.state();
            if state.phase == Phase::Progress {
                return false;
            }
            state.generation
        };

        let selection = SelectionState::load(targets, &self.directory).await;

        let snapshot = {
            let mut state = self.state();
            if state.generation != generation || state.phase == Phase::Progress {
                debug!("[BULK-ASSIGN] Reopen superseded");
                return false;
            }
            reset_state(&mut state, Some(selection));
            state.snapshot()
        };
        self.emit(snapshot);
        true
    }
}

impl<T: TaskOps, D: DirectoryOps> Drop for BulkAssignDialog<T, D> {
    fn drop(&mut self) {
        let mut state = self.state();
        if state.poll.is_some() {
            debug!("[BULK-ASSIGN] Dialog dropped, stopping poller");
        }
        state.release_poll();
    }
}

fn reset_state(state: &mut DialogState, selection: Option<SelectionState>) {
    state.release_poll();
    state.generation = state.generation.wrapping_add(1);
    state.phase = Phase::Select;
    state.submitting = false;
    state.task = None;
    state.failure = None;
    state.selection = match selection {
        Some(selection) => selection,
        None => std::mem::take(&mut state.selection).into_fresh(),
    };
}

/// Applies one poller event. Returns the poller control and whether the
/// state changed.
fn on_poll_event(
    state: &mut DialogState,
    generation: u64,
    task_id: &str,
    event: PollEvent,
) -> (PollControl, bool) {
    if state.generation != generation || state.phase != Phase::Progress {
        return (PollControl::Stop, false);
    }
    let Some(task) = state.task.as_mut().filter(|t| t.id == task_id) else {
        return (PollControl::Stop, false);
    };

    match event {
        PollEvent::Progress(progress) => {
            let terminal = progress.status.is_terminal();
            if let Err(rejected) = task.apply(progress) {
                if !terminal {
                    warn!(
                        "[BULK-ASSIGN] Ignoring progress for task {}: {}",
                        redact_id(task_id),
                        rejected
                    );
                    return (PollControl::Continue, false);
                }
                warn!(
                    "[BULK-ASSIGN] Task {} completed with invalid results, keeping last known: {}",
                    redact_id(task_id),
                    rejected
                );
                task.complete_with_last_known();
            }
            if !task.is_completed() {
                return (PollControl::Continue, true);
            }
            info!(
                "[BULK-ASSIGN] Task {} completed: {}/{} items",
                redact_id(task_id),
                task.completed,
                task.total
            );
        }
        PollEvent::Expired => {
            task.timed_out = true;
            warn!(
                "[BULK-ASSIGN] Task {} timed out at {}/{} items",
                redact_id(task_id),
                task.completed,
                task.total
            );
        }
    }

    state.phase = Phase::Result;
    state.release_poll();
    (PollControl::Stop, true)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
