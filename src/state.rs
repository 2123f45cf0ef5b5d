//! Application state shared by the desktop commands.
//!
//! Holds the backend clients and the currently open bulk assignment dialog.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::assign::{BulkAssignDialog, Phase, ProgressSink, TargetRef};
use crate::backend::{ApiClient, BulkAssignClient, DirectoryClient};
use crate::config::AppConfig;
use crate::error::AppError;

/// The dialog wired to the real backend clients.
pub type AssignDialog = BulkAssignDialog<BulkAssignClient, DirectoryClient>;

// ─────────────────────────────────────────────────────────────────────────────
// Application State
// ─────────────────────────────────────────────────────────────────────────────

/// Global application state.
///
/// Managed by Tauri in the desktop build and injected into commands via
/// `tauri::State<AppState>`.
pub struct AppState {
    pub config: AppConfig,
    tasks: BulkAssignClient,
    directory: DirectoryClient,
    /// The open dialog, if any. At most one exists at a time.
    dialog: RwLock<Option<Arc<AssignDialog>>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        let api = ApiClient::from_config(&config)?;

        Ok(Self {
            tasks: BulkAssignClient::new(api.clone()),
            directory: DirectoryClient::new(api, config.org_id.clone()),
            config,
            dialog: RwLock::new(None),
        })
    }

    /// Opens the dialog for `targets`.
    ///
    /// An existing dialog is reopened onto the new patients and keeps the
    /// sink it was first opened with. If a task is still running, that
    /// dialog is returned unchanged.
    pub async fn open_dialog(
        &self,
        targets: Vec<TargetRef>,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> Arc<AssignDialog> {
        let mut slot = self.dialog.write().await;

        if let Some(existing) = slot.as_ref() {
            let existing = Arc::clone(existing);
            if existing.phase() == Phase::Progress || !existing.reopen(targets).await {
                info!("[BULK-ASSIGN] Task in progress, keeping the open dialog");
            }
            return existing;
        }

        let mut dialog = AssignDialog::open(
            self.tasks.clone(),
            self.directory.clone(),
            self.config.poll,
            targets,
        )
        .await;
        if let Some(sink) = sink {
            dialog = dialog.with_sink(sink);
        }

        let dialog = Arc::new(dialog);
        *slot = Some(Arc::clone(&dialog));
        dialog
    }

    /// The open dialog.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when no dialog is open.
    pub async fn dialog(&self) -> Result<Arc<AssignDialog>, AppError> {
        self.dialog
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::NotFound("No bulk assignment is open".to_string()))
    }

    /// Closes the open dialog.
    ///
    /// Returns `false` while a task is in progress; the dialog stays open and
    /// keeps polling.
    pub async fn close_dialog(&self) -> bool {
        let mut slot = self.dialog.write().await;

        let Some(dialog) = slot.as_ref() else {
            return true;
        };
        if !dialog.close() {
            return false;
        }

        *slot = None;
        true
    }
}
