//! Journaled repository mutations and their inverses.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use crate::error::{ReleaseError, Result};
use crate::release::Toolkit;
use crate::vcs::{CheckoutOptions, DeleteBranchOptions, ResetOptions, StashOptions, TagOptions};
use crate::vcs::{Vcs, VcsKind};
use crate::version::Version;

/// Catalog of mutations the release engine knows how to undo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UndoKind {
    StashSave,
    CreateBranch,
    Checkout,
    PullBranch,
    Merge,
    CreateTag,
    Commit,
    BumpVersion,
}

impl UndoKind {
    pub const ALL: [UndoKind; 8] = [
        UndoKind::StashSave,
        UndoKind::CreateBranch,
        UndoKind::Checkout,
        UndoKind::PullBranch,
        UndoKind::Merge,
        UndoKind::CreateTag,
        UndoKind::Commit,
        UndoKind::BumpVersion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UndoKind::StashSave => "stash-save",
            UndoKind::CreateBranch => "create-branch",
            UndoKind::Checkout => "checkout",
            UndoKind::PullBranch => "pull-branch",
            UndoKind::Merge => "merge",
            UndoKind::CreateTag => "create-tag",
            UndoKind::Commit => "commit",
            UndoKind::BumpVersion => "bump-version",
        }
    }

    /// Keys an action of this kind must carry, no more and no less
    pub fn required_params(self) -> &'static [&'static str] {
        match self {
            UndoKind::StashSave => &["name"],
            UndoKind::CreateBranch | UndoKind::Checkout => &["newBranch", "oldBranch"],
            UndoKind::PullBranch => &["branch", "nextHead", "prevHead"],
            UndoKind::Merge => &["nextHead", "prevHead", "source", "target"],
            UndoKind::CreateTag => &["name"],
            UndoKind::Commit => &["branch", "nextHead", "prevHead", "subject"],
            UndoKind::BumpVersion => &["newVersion", "oldVersion"],
        }
    }

    fn title(self, p: &BTreeMap<String, String>) -> String {
        let get = |key: &str| p.get(key).map(String::as_str).unwrap_or_default();
        match self {
            UndoKind::StashSave => format!("Create stash '{}'", get("name")),
            UndoKind::CreateBranch => format!(
                "Create branch {} from {}",
                get("newBranch"),
                get("oldBranch")
            ),
            UndoKind::Checkout => format!(
                "Switch branch from {} -> {}",
                get("oldBranch"),
                get("newBranch")
            ),
            UndoKind::PullBranch => format!(
                "Pull {} ({} -> {})",
                get("branch"),
                get("prevHead"),
                get("nextHead")
            ),
            UndoKind::Merge => format!("Merge branch {} -> {}", get("source"), get("target")),
            UndoKind::CreateTag => format!("Create tag {}", get("name")),
            UndoKind::Commit => format!(
                "Commit staged files on {} ({} -> {}) - {}",
                get("branch"),
                get("prevHead"),
                get("nextHead"),
                get("subject")
            ),
            UndoKind::BumpVersion => format!(
                "Bump version {} -> {}",
                get("oldVersion"),
                get("newVersion")
            ),
        }
    }

    fn validate(self, params: &BTreeMap<String, String>) -> Result<()> {
        let required = self.required_params();
        if let Some(missing) = required.iter().find(|k| !params.contains_key(**k)) {
            return Err(ReleaseError::params(
                self.name(),
                format!("missing key '{}'", missing),
            ));
        }
        if let Some(extra) = params.keys().find(|k| !required.contains(&k.as_str())) {
            return Err(ReleaseError::params(
                self.name(),
                format!("unexpected key '{}'", extra),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for UndoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for UndoKind {
    type Err = ReleaseError;

    /// Accepts both `create-branch` and `create_branch`
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.replace('_', "-");
        UndoKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == normalized)
            .ok_or_else(|| ReleaseError::UnknownUndoAction(s.to_string()))
    }
}

/// Build a parameter map from key/value pairs
pub fn params<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// One journaled mutation.
///
/// The name is kept as text so that a record written by another version
/// of the tool still loads; an unknown name only fails when replayed.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoAction {
    pub id: usize,
    pub date: DateTime<Utc>,
    pub name: String,
    pub title: String,
    pub path: PathBuf,
    pub vcs: VcsKind,
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub executed: bool,
    #[serde(skip)]
    handle: Option<Box<dyn Vcs>>,
}

impl UndoAction {
    /// Validate `params` against the catalog entry for `name` and bind a
    /// handle on the repository at `path`.
    pub fn create(
        name: &str,
        path: &Path,
        vcs: VcsKind,
        params: BTreeMap<String, String>,
        tools: &Toolkit,
    ) -> Result<Self> {
        let kind: UndoKind = name.parse()?;
        kind.validate(&params)?;
        let mut action = UndoAction {
            id: 0,
            date: Utc::now(),
            name: kind.name().to_string(),
            title: kind.title(&params),
            path: path.to_path_buf(),
            vcs,
            params,
            executed: false,
            handle: None,
        };
        action.bind(tools)?;
        Ok(action)
    }

    pub fn kind(&self) -> Result<UndoKind> {
        self.name.parse()
    }

    pub fn is_bound(&self) -> bool {
        self.handle.is_some()
    }

    /// Open a live handle for the recorded path and kind
    pub fn bind(&mut self, tools: &Toolkit) -> Result<()> {
        self.handle = Some(tools.vcs.open_as(self.vcs, &self.path)?);
        Ok(())
    }

    fn param(&self, key: &str) -> Result<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ReleaseError::params(&self.name, format!("missing key '{}'", key)))
    }

    /// Apply the inverse of this action. The action counts as executed
    /// afterwards whether or not the inverse succeeded.
    pub fn run(&mut self, tools: &Toolkit) -> Result<()> {
        let span = info_span!("undo", action = %self.title);
        let _enter = span.enter();
        let result = self.invert(tools);
        self.executed = true;
        result
    }

    fn invert(&mut self, tools: &Toolkit) -> Result<()> {
        let kind = self.kind()?;
        kind.validate(&self.params)?;
        if !self.is_bound() {
            self.bind(tools)?;
        }
        let vcs = self
            .handle
            .as_deref()
            .ok_or_else(|| ReleaseError::invalid_state("undo action has no repository handle"))?;

        match kind {
            UndoKind::StashSave => {
                debug!("pop stash");
                vcs.stash(&StashOptions::pop())?;
            }
            UndoKind::CreateBranch => {
                let branch = self.param("newBranch")?;
                if vcs.has_branch(branch)? {
                    debug!(branch, "delete branch");
                    vcs.delete_branch(
                        branch,
                        &DeleteBranchOptions {
                            force: true,
                            remote: None,
                        },
                    )?;
                } else {
                    info!(branch, "branch already gone");
                }
            }
            UndoKind::PullBranch | UndoKind::Commit => {
                self.reset_branch(vcs, self.param("branch")?)?;
            }
            UndoKind::Merge => {
                self.reset_branch(vcs, self.param("target")?)?;
            }
            UndoKind::Checkout => {
                let branch = self.param("oldBranch")?;
                if vcs.has_branch(branch)? {
                    debug!(branch, "checkout");
                    vcs.checkout(branch, &CheckoutOptions::default())?;
                } else {
                    info!(branch, "branch no longer exists, staying put");
                }
            }
            UndoKind::CreateTag => {
                let tag = self.param("name")?;
                debug!(tag, "delete tag");
                vcs.tag(
                    tag,
                    &TagOptions {
                        delete: true,
                        ..Default::default()
                    },
                )?;
            }
            UndoKind::BumpVersion => {
                let old = Version::parse(self.param("oldVersion")?)?;
                let manifest = tools.manifests.open(&self.path)?;
                if manifest.read_version()? != old {
                    debug!(version = %old, "restore manifest version");
                    manifest.write_version(&old)?;
                }
            }
        }
        Ok(())
    }

    fn reset_branch(&self, vcs: &dyn Vcs, branch: &str) -> Result<()> {
        let prev = self.param("prevHead")?;
        debug!(branch, "checkout");
        vcs.checkout(branch, &CheckoutOptions::default())?;
        debug!(to = prev, "reset head");
        vcs.reset(&ResetOptions {
            hard: true,
            commit: Some(prev.to_string()),
        })
    }
}

impl fmt::Debug for UndoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoAction")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("title", &self.title)
            .field("path", &self.path)
            .field("vcs", &self.vcs)
            .field("params", &self.params)
            .field("executed", &self.executed)
            .finish()
    }
}
