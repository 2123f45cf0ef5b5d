//! Bulk care-team assignment Tauri commands.
//!
//! Thin wrappers over [`AssignDialog`](crate::state::AssignDialog). Every
//! state change is pushed to the frontend as a `bulk-assign-progress` event
//! carrying a [`DialogSnapshot`].

use std::sync::Arc;

use serde::Serialize;
use tauri::{AppHandle, Emitter, State};
use tracing::{debug, info};

use crate::assign::{DialogSnapshot, Phase, ProgressSink, TargetRef};
use crate::backend::AssignableUser;
use crate::error::AppError;
use crate::state::AppState;

/// Event name for dialog state updates.
const PROGRESS_EVENT: &str = "bulk-assign-progress";

// ─────────────────────────────────────────────────────────────────────────────
// Event Sink
// ─────────────────────────────────────────────────────────────────────────────

/// Forwards dialog snapshots to the frontend.
struct EventSink {
    app: AppHandle,
}

impl ProgressSink for EventSink {
    fn emit(&self, snapshot: &DialogSnapshot) {
        if let Err(e) = self.app.emit(PROGRESS_EVENT, snapshot) {
            debug!("[BULK-ASSIGN] Failed to emit progress event: {}", e);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// Dialog state plus the candidates matching the current filter.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionView {
    pub snapshot: DialogSnapshot,
    pub candidates: Vec<AssignableUser>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Opens the bulk assignment dialog for the given patients.
///
/// If a task is still running, the existing dialog is returned as is.
#[tauri::command]
pub async fn open_bulk_assign(
    app: AppHandle,
    state: State<'_, AppState>,
    targets: Vec<TargetRef>,
) -> Result<SelectionView, AppError> {
    info!("[BULK-ASSIGN] Opening dialog for {} patients", targets.len());

    let sink: Arc<dyn ProgressSink> = Arc::new(EventSink { app });
    let dialog = state.open_dialog(targets, Some(sink)).await;

    Ok(SelectionView {
        snapshot: dialog.snapshot(),
        candidates: dialog.visible_candidates(),
    })
}

/// Updates the member filter and returns the matching candidates.
#[tauri::command]
pub async fn filter_assignees(
    state: State<'_, AppState>,
    query: String,
) -> Result<Vec<AssignableUser>, AppError> {
    let dialog = state.dialog().await?;
    dialog.set_query(&query);
    Ok(dialog.visible_candidates())
}

/// Toggles a member; returns whether it is now selected.
#[tauri::command]
pub async fn toggle_assignee(
    state: State<'_, AppState>,
    user_id: String,
) -> Result<bool, AppError> {
    let dialog = state.dialog().await?;
    Ok(dialog.toggle_assignee(&user_id))
}

/// Submits the current selection.
///
/// Returns the resulting snapshot. A refused submission (nothing selected,
/// or a task already running) returns the unchanged snapshot.
#[tauri::command]
pub async fn submit_bulk_assign(state: State<'_, AppState>) -> Result<DialogSnapshot, AppError> {
    let dialog = state.dialog().await?;

    match dialog.submit().await {
        Some(Phase::Result) => info!("[BULK-ASSIGN] Submission failed, showing result"),
        Some(phase) => debug!("[BULK-ASSIGN] Submission moved dialog to {:?}", phase),
        None => debug!("[BULK-ASSIGN] Submission refused"),
    }

    Ok(dialog.snapshot())
}

#[tauri::command]
pub async fn bulk_assign_snapshot(state: State<'_, AppState>) -> Result<DialogSnapshot, AppError> {
    Ok(state.dialog().await?.snapshot())
}

/// Closes the dialog. Returns `false` while a task is in progress.
#[tauri::command]
pub async fn close_bulk_assign(state: State<'_, AppState>) -> Result<bool, AppError> {
    Ok(state.close_dialog().await)
}
