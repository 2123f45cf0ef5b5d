//! Selection stage: which patients get which care-team members.
//!
//! The patient list is a snapshot taken when the dialog opens. Members come
//! from the user directory and can be filtered and toggled until submission.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assign::DirectoryOps;
use crate::backend::AssignableUser;

/// A patient selected to receive the assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub id: String,
    pub name: String,
    /// Communication channel the members are invited to. Without it the
    /// backend skips the patient.
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl TargetRef {
    pub fn has_linkage(&self) -> bool {
        self.channel_id
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }
}

/// A validated submission: at least one patient and at least one member.
///
/// Only [`SelectionState::submission`] can build one, so an empty request
/// never reaches the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    target_ids: Vec<String>,
    assignee_ids: Vec<String>,
}

impl Submission {
    pub fn target_ids(&self) -> &[String] {
        &self.target_ids
    }

    pub fn assignee_ids(&self) -> &[String] {
        &self.assignee_ids
    }
}

/// Selection made in the first stage of the dialog.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    targets: Vec<TargetRef>,
    candidates: Vec<AssignableUser>,
    selected: Vec<String>,
    query: String,
}

impl SelectionState {
    pub fn new(targets: Vec<TargetRef>, candidates: Vec<AssignableUser>) -> Self {
        Self {
            targets,
            candidates,
            selected: Vec::new(),
            query: String::new(),
        }
    }

    /// Builds a selection, loading member candidates from the directory.
    ///
    /// A directory failure leaves the candidate list empty.
    pub async fn load<D: DirectoryOps + ?Sized>(targets: Vec<TargetRef>, directory: &D) -> Self {
        let candidates = match directory.list_assignable_users().await {
            Ok(users) => users,
            Err(e) => {
                warn!("[DIRECTORY] Failed to load assignable users: {}", e);
                Vec::new()
            }
        };

        info!(
            "[BULK-ASSIGN] Selection opened with {} patients, {} candidates",
            targets.len(),
            candidates.len()
        );

        Self::new(targets, candidates)
    }

    pub fn targets(&self) -> &[TargetRef] {
        &self.targets
    }

    pub fn candidates(&self) -> &[AssignableUser] {
        &self.candidates
    }

    /// Drops the member choice and filter, keeping patients and candidates.
    pub fn into_fresh(self) -> Self {
        Self::new(self.targets, self.candidates)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// Candidates matching the current query, in directory order.
    ///
    /// Matching is a case-insensitive substring test against name, display
    /// name, id and email. A blank query matches everyone.
    pub fn visible_candidates(&self) -> Vec<&AssignableUser> {
        let needle = self.query.trim().to_lowercase();
        if needle.is_empty() {
            return self.candidates.iter().collect();
        }

        self.candidates
            .iter()
            .filter(|u| {
                [&u.name, &u.display_name, &u.id, &u.email]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Flips a member in or out of the selection.
    ///
    /// Returns whether the member is selected afterwards. Ids that are not
    /// known candidates are ignored.
    pub fn toggle(&mut self, user_id: &str) -> bool {
        if let Some(pos) = self.selected.iter().position(|id| id == user_id) {
            self.selected.remove(pos);
            return false;
        }

        if !self.candidates.iter().any(|u| u.id == user_id) {
            return false;
        }

        self.selected.push(user_id.to_string());
        true
    }

    pub fn is_selected(&self, user_id: &str) -> bool {
        self.selected.iter().any(|id| id == user_id)
    }

    /// Selected member ids in the order they were picked.
    pub fn selected_ids(&self) -> &[String] {
        &self.selected
    }

    /// Adds every currently visible candidate to the selection.
    pub fn select_visible(&mut self) {
        let visible: Vec<String> = self
            .visible_candidates()
            .into_iter()
            .map(|u| u.id.clone())
            .collect();

        for id in visible {
            if !self.is_selected(&id) {
                self.selected.push(id);
            }
        }
    }

    pub fn clear_selected(&mut self) {
        self.selected.clear();
    }

    /// Patients that will be submitted but lack a channel.
    ///
    /// They stay in the submission; the backend reports them as skipped.
    pub fn linkage_warnings(&self) -> Vec<&TargetRef> {
        self.targets.iter().filter(|t| !t.has_linkage()).collect()
    }

    pub fn can_submit(&self) -> bool {
        !self.targets.is_empty() && !self.selected.is_empty()
    }

    /// Builds the submission, or `None` while the guard is not satisfied.
    pub fn submission(&self) -> Option<Submission> {
        if !self.can_submit() {
            return None;
        }

        Some(Submission {
            target_ids: self.targets.iter().map(|t| t.id.clone()).collect(),
            assignee_ids: self.selected.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::future::Future;
    use std::pin::Pin;

    pub(crate) fn user(id: &str, name: &str, display_name: &str) -> AssignableUser {
        AssignableUser {
            id: id.to_string(),
            name: name.to_string(),
            display_name: display_name.to_string(),
            email: format!("{}@example.com", id.to_lowercase()),
        }
    }

    fn target(id: &str, channel: Option<&str>) -> TargetRef {
        TargetRef {
            id: id.to_string(),
            name: format!("Patient {}", id),
            channel_id: channel.map(str::to_string),
        }
    }

    fn selection() -> SelectionState {
        SelectionState::new(
            vec![target("p1", Some("C1")), target("p2", None)],
            vec![
                user("U1", "Hanako Sato", "hanako"),
                user("U2", "Taro Ito", "taro.nurse"),
                user("U3", "Ken Mori", ""),
            ],
        )
    }

    struct FailingDirectory;

    impl DirectoryOps for FailingDirectory {
        fn list_assignable_users(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<AssignableUser>, AppError>> + Send + '_>>
        {
            Box::pin(async { Err(AppError::ConnectionFailed("offline".into())) })
        }
    }

    #[tokio::test]
    async fn directory_failure_yields_empty_candidates() {
        let selection = SelectionState::load(vec![target("p1", Some("C1"))], &FailingDirectory).await;
        assert!(selection.candidates().is_empty());
        assert_eq!(selection.targets().len(), 1);
        assert!(!selection.can_submit());
    }

    #[test]
    fn filter_is_case_insensitive_across_fields() {
        let mut selection = selection();

        selection.set_query("SATO");
        let ids: Vec<&str> = selection.visible_candidates().iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["U1"]);

        selection.set_query("nurse");
        let ids: Vec<&str> = selection.visible_candidates().iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["U2"]);

        selection.set_query("u3");
        let ids: Vec<&str> = selection.visible_candidates().iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["U3"]);

        selection.set_query("   ");
        assert_eq!(selection.visible_candidates().len(), 3);

        selection.set_query("nobody");
        assert!(selection.visible_candidates().is_empty());
    }

    #[test]
    fn toggle_adds_and_removes() {
        let mut selection = selection();

        assert!(selection.toggle("U2"));
        assert!(selection.toggle("U1"));
        assert_eq!(selection.selected_ids(), &["U2".to_string(), "U1".to_string()]);

        assert!(!selection.toggle("U2"));
        assert_eq!(selection.selected_ids(), &["U1".to_string()]);
        assert!(!selection.is_selected("U2"));
    }

    #[test]
    fn toggle_ignores_unknown_ids() {
        let mut selection = selection();
        assert!(!selection.toggle("U999"));
        assert!(selection.selected_ids().is_empty());
    }

    #[test]
    fn select_visible_respects_filter() {
        let mut selection = selection();
        selection.toggle("U3");
        selection.set_query("a");
        selection.select_visible();

        assert_eq!(
            selection.selected_ids(),
            &["U3".to_string(), "U1".to_string(), "U2".to_string()]
        );

        selection.clear_selected();
        assert!(selection.selected_ids().is_empty());
    }

    #[test]
    fn guard_requires_assignees() {
        let mut selection = selection();
        assert!(!selection.can_submit());
        assert!(selection.submission().is_none());

        selection.toggle("U1");
        let submission = selection.submission().expect("guard should pass");
        assert_eq!(submission.target_ids(), &["p1".to_string(), "p2".to_string()]);
        assert_eq!(submission.assignee_ids(), &["U1".to_string()]);
    }

    #[test]
    fn guard_requires_targets() {
        let mut selection = SelectionState::new(Vec::new(), vec![user("U1", "Hanako", "")]);
        selection.toggle("U1");
        assert!(selection.submission().is_none());
    }

    #[test]
    fn targets_without_channel_are_warned_not_dropped() {
        let mut selection = selection();
        selection.toggle("U1");

        let warnings: Vec<&str> = selection
            .linkage_warnings()
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(warnings, vec!["p2"]);

        let submission = selection.submission().unwrap();
        assert!(submission.target_ids().contains(&"p2".to_string()));
    }

    #[test]
    fn blank_channel_counts_as_missing() {
        assert!(!target("p3", Some("  ")).has_linkage());
        assert!(target("p3", Some("C9")).has_linkage());
    }

    #[test]
    fn into_fresh_clears_choice_keeps_candidates() {
        let mut selection = selection();
        selection.toggle("U1");
        selection.set_query("ken");

        let fresh = selection.into_fresh();
        assert!(fresh.selected_ids().is_empty());
        assert!(fresh.query().is_empty());
        assert_eq!(fresh.candidates().len(), 3);
        assert_eq!(fresh.targets().len(), 2);
    }
}
