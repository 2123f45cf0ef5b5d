//! Backend HTTP clients.
//!
//! - **client**: shared JSON client with bearer auth and log-safe URLs
//! - **tasks**: start and poll bulk assignment tasks
//! - **directory**: list users that can join a care team

pub mod client;
pub mod directory;
pub mod tasks;

pub use client::ApiClient;
pub use directory::{AssignableUser, DirectoryClient};
pub use tasks::{
    BulkAssignClient, BulkAssignProgress, BulkAssignStarted, ItemResult, Outcome, TaskStatus,
};
