use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{ReleaseError, Result};
use crate::release::undo::{UndoAction, UndoKind};
use crate::release::Toolkit;
use crate::vcs::VcsKind;

/// Ordered list of the mutations one release performed
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Journal {
    actions: Vec<UndoAction>,
}

impl Journal {
    pub fn new() -> Self {
        Journal::default()
    }

    pub fn push(&mut self, mut action: UndoAction) {
        action.id = self.actions.len();
        debug!(id = action.id, title = %action.title, "journaled");
        self.actions.push(action);
    }

    /// Create an action and append it
    pub fn record(
        &mut self,
        kind: UndoKind,
        path: &Path,
        vcs: VcsKind,
        params: BTreeMap<String, String>,
        tools: &Toolkit,
    ) -> Result<()> {
        let action = UndoAction::create(kind.name(), path, vcs, params, tools)?;
        self.push(action);
        Ok(())
    }

    pub fn actions(&self) -> &[UndoAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions not replayed yet
    pub fn pending(&self) -> usize {
        self.actions.iter().filter(|a| !a.executed).count()
    }

    /// Replay every pending action, newest first.
    ///
    /// A failing action does not stop the replay; all failures are
    /// reported together as [`ReleaseError::Rollback`].
    pub fn rollback(&mut self, tools: &Toolkit) -> Result<()> {
        let mut errors = Vec::new();
        for action in self.actions.iter_mut().rev() {
            if action.executed {
                debug!(id = action.id, title = %action.title, "already undone, skipping");
                continue;
            }
            info!(id = action.id, title = %action.title, "undo");
            if let Err(e) = action.run(tools) {
                error!(id = action.id, error = %e, "undo failed");
                errors.push(format!("{}: {}", action.title, e));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ReleaseError::Rollback { errors })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::undo::params;
    use crate::vcs::{CheckoutOptions, MockBackend};
    use std::path::PathBuf;

    fn setup() -> (MockBackend, PathBuf, Toolkit) {
        let backend = MockBackend::new();
        let path = PathBuf::from("/mock/web");
        backend.init_repo(&path, &["develop", "master"], "develop");
        let tools = Toolkit::mock(backend.clone());
        (backend, path, tools)
    }

    #[test]
    fn test_rollback_runs_in_reverse() {
        let (backend, path, tools) = setup();
        let vcs = tools.vcs.open(&path).unwrap();
        let mut journal = Journal::new();

        vcs.checkout("master", &CheckoutOptions::default()).unwrap();
        journal
            .record(
                UndoKind::Checkout,
                &path,
                VcsKind::Git,
                params([("oldBranch", "develop"), ("newBranch", "master")]),
                &tools,
            )
            .unwrap();
        vcs.checkout(
            "release/1.0.0",
            &CheckoutOptions {
                create_branch: true,
                ..Default::default()
            },
        )
        .unwrap();
        journal
            .record(
                UndoKind::CreateBranch,
                &path,
                VcsKind::Git,
                params([("oldBranch", "master"), ("newBranch", "release/1.0.0")]),
                &tools,
            )
            .unwrap();
        journal
            .record(
                UndoKind::Checkout,
                &path,
                VcsKind::Git,
                params([("oldBranch", "master"), ("newBranch", "release/1.0.0")]),
                &tools,
            )
            .unwrap();
        assert_eq!(
            journal.actions().iter().map(|a| a.id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let before = backend.calls(&path).len();
        journal.rollback(&tools).unwrap();
        let undo_calls = backend.calls(&path)[before..].to_vec();
        assert_eq!(
            undo_calls,
            vec!["checkout master", "branch -D release/1.0.0", "checkout develop"]
        );
        assert_eq!(journal.pending(), 0);
    }

    #[test]
    fn test_rollback_collects_every_failure() {
        let (backend, path, tools) = setup();
        let mut journal = Journal::new();
        journal
            .record(
                UndoKind::CreateTag,
                &path,
                VcsKind::Git,
                params([("name", "1.0.0")]),
                &tools,
            )
            .unwrap();
        journal
            .record(
                UndoKind::StashSave,
                &path,
                VcsKind::Git,
                params([("name", "before release")]),
                &tools,
            )
            .unwrap();
        journal
            .record(
                UndoKind::Checkout,
                &path,
                VcsKind::Git,
                params([("oldBranch", "master"), ("newBranch", "develop")]),
                &tools,
            )
            .unwrap();

        let err = journal.rollback(&tools).unwrap_err();
        match err {
            ReleaseError::Rollback { errors } => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].starts_with("Create stash"));
                assert!(errors[1].starts_with("Create tag 1.0.0"));
            }
            other => panic!("unexpected error: {}", other),
        }
        // the checkout in between still ran
        assert_eq!(backend.current_branch(&path).unwrap(), "master");
    }

    #[test]
    fn test_second_rollback_skips_executed() {
        let (backend, path, tools) = setup();
        let mut journal = Journal::new();
        journal
            .record(
                UndoKind::Checkout,
                &path,
                VcsKind::Git,
                params([("oldBranch", "master"), ("newBranch", "develop")]),
                &tools,
            )
            .unwrap();

        journal.rollback(&tools).unwrap();
        let calls = backend.calls(&path).len();
        journal.rollback(&tools).unwrap();
        assert_eq!(backend.calls(&path).len(), calls);
    }

    #[test]
    fn test_journal_serializes_as_list() {
        let (_backend, path, tools) = setup();
        let mut journal = Journal::new();
        journal
            .record(
                UndoKind::CreateTag,
                &path,
                VcsKind::Git,
                params([("name", "1.0.0")]),
                &tools,
            )
            .unwrap();

        let json = serde_json::to_value(&journal).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["name"], "create-tag");
        assert_eq!(json[0]["params"]["name"], "1.0.0");
        assert_eq!(json[0]["executed"], false);
    }
}
