pub mod assign;
pub mod backend;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod config;
pub mod error;
pub mod state;
pub mod telemetry;

#[cfg(feature = "desktop")]
use tauri::Manager;

#[cfg(feature = "desktop")]
use crate::commands::{
    bulk_assign_snapshot, close_bulk_assign, filter_assignees, open_bulk_assign,
    submit_bulk_assign, toggle_assignee,
};

/// Builds the Tauri application with state and bulk assignment commands
/// registered.
///
/// The host binary finishes it with `.run(tauri::generate_context!())`.
#[cfg(feature = "desktop")]
pub fn builder() -> tauri::Builder<tauri::Wry> {
    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();
    telemetry::init();

    tauri::Builder::default()
        .setup(|app| {
            let config = config::AppConfig::from_env()?;
            tracing::info!(
                "[BULK-ASSIGN] Backend host: {}",
                config.api_url.host_str().unwrap_or("<none>")
            );

            let state = state::AppState::new(config)?;
            app.manage(state);

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            open_bulk_assign,
            filter_assignees,
            toggle_assignee,
            submit_bulk_assign,
            bulk_assign_snapshot,
            close_bulk_assign,
        ])
}
