//! Version control abstraction layer
//!
//! Every backend provides the same operation set so the release engine never
//! cares which tool owns a project.
//!
//! # Overview
//!
//! - [Backend]: one per tool, knows how to detect, open, initialize and clone
//!   repositories of its kind
//! - [Vcs]: a handle bound to one repository path, carrying out every other
//!   operation by running the tool with that path as working directory
//! - [Registry]: the set of known backends, probed in registration order
//!
//! The concrete backends are [git::GitBackend], [hg::HgBackend] and
//! [svn::SvnBackend]; [mock::MockBackend] keeps repositories in memory for
//! tests.

pub mod git;
pub mod hg;
pub mod mock;
pub mod options;
pub mod svn;

pub use git::GitBackend;
pub use hg::HgBackend;
pub use mock::MockBackend;
pub use options::*;
pub use svn::SvnBackend;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ReleaseError, Result};
use crate::exec::CommandRunner;

/// Kind of version control tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    Git,
    Hg,
    Svn,
}

impl VcsKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VcsKind::Git => "git",
            VcsKind::Hg => "hg",
            VcsKind::Svn => "svn",
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VcsKind {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "git" => Ok(VcsKind::Git),
            "hg" | "mercurial" => Ok(VcsKind::Hg),
            "svn" | "subversion" => Ok(VcsKind::Svn),
            other => Err(ReleaseError::invalid_argument(format!(
                "unknown version control kind '{}'",
                other
            ))),
        }
    }
}

/// A commit author
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub email: String,
}

impl Person {
    /// Parse `Name <email>`; text without an address becomes a bare name
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match (text.rfind('<'), text.rfind('>')) {
            (Some(open), Some(close)) if open < close => Person {
                name: text[..open].trim().to_string(),
                email: text[open + 1..close].trim().to_string(),
            },
            _ => Person {
                name: text.to_string(),
                email: String::new(),
            },
        }
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.email.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} <{}>", self.name, self.email)
        }
    }
}

/// Hash and subject line of a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub hash: String,
    pub subject: String,
}

/// Factory for handles of one version control kind
pub trait Backend: Send + Sync {
    fn kind(&self) -> VcsKind;

    /// Whether `path` is a working copy of this kind
    fn detect(&self, path: &Path) -> bool;

    fn open(&self, path: &Path) -> Result<Box<dyn Vcs>>;

    fn initialize(&self, path: &Path, opts: &InitOptions) -> Result<Box<dyn Vcs>>;

    fn clone_repo(&self, url: &str, path: &Path, opts: &CloneOptions) -> Result<Box<dyn Vcs>>;
}

/// Handle bound to one working copy.
///
/// Handles keep no state of their own: every query goes back to the tool.
/// Only checkout, commit, merge, tag, stash, reset, pull, push and
/// delete_branch change the repository.
pub trait Vcs: Send + Sync {
    fn kind(&self) -> VcsKind;

    fn path(&self) -> &Path;

    fn stage(&self, opts: &StageOptions) -> Result<()>;

    fn commit(&self, opts: &CommitOptions) -> Result<()>;

    /// Changed paths, one per line; empty when the working tree is clean
    fn status(&self, opts: &StatusOptions) -> Result<Vec<String>>;

    fn current_branch(&self) -> Result<String>;

    fn current_commit(&self, opts: &CurrentCommitOptions) -> Result<Commit>;

    fn extract_log(&self, opts: &ExtractLogOptions) -> Result<Vec<String>>;

    fn checkout(&self, branch: &str, opts: &CheckoutOptions) -> Result<()>;

    fn reset(&self, opts: &ResetOptions) -> Result<()>;

    fn pull(&self, opts: &PullOptions) -> Result<()>;

    fn push(&self, opts: &PushOptions) -> Result<()>;

    /// Create, or with `opts.delete` remove, a tag
    fn tag(&self, name: &str, opts: &TagOptions) -> Result<()>;

    /// Merge `source` into `dest`, leaving `dest` checked out
    fn merge(&self, source: &str, dest: &str, opts: &MergeOptions) -> Result<()>;

    fn stash(&self, opts: &StashOptions) -> Result<Vec<String>>;

    fn list_stashes(&self) -> Result<Vec<String>>;

    fn delete_branch(&self, name: &str, opts: &DeleteBranchOptions) -> Result<()>;

    fn list_branches(&self, opts: &ListBranchesOptions) -> Result<Vec<String>>;

    fn list_authors(&self, opts: &ListAuthorsOptions) -> Result<Vec<Person>>;

    /// Remote name to URL
    fn list_remotes(&self, opts: &ListRemotesOptions) -> Result<BTreeMap<String, String>>;

    fn list_tags(&self, opts: &ListTagsOptions) -> Result<Vec<String>>;

    fn is_dirty(&self) -> Result<bool> {
        Ok(!self.status(&StatusOptions { short: true })?.is_empty())
    }

    fn has_branch(&self, name: &str) -> Result<bool> {
        Ok(self
            .list_branches(&ListBranchesOptions::default())?
            .iter()
            .any(|b| b == name))
    }

    fn has_tag(&self, name: &str) -> Result<bool> {
        Ok(self
            .list_tags(&ListTagsOptions::default())?
            .iter()
            .any(|t| t == name))
    }
}

impl fmt::Debug for dyn Vcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vcs")
            .field("kind", &self.kind())
            .field("path", &self.path())
            .finish()
    }
}

/// Known backends, probed in registration order
#[derive(Clone, Default)]
pub struct Registry {
    backends: Vec<Arc<dyn Backend>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// git, then Mercurial, then Subversion, all running through `runner`
    pub fn with_defaults(runner: Arc<dyn CommandRunner>) -> Self {
        let mut registry = Registry::new();
        registry.register(Arc::new(GitBackend::new(runner.clone())));
        registry.register(Arc::new(HgBackend::new(runner.clone())));
        registry.register(Arc::new(SvnBackend::new(runner)));
        registry
    }

    /// Add a backend, replacing any already registered for the same kind
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        match self.backends.iter().position(|b| b.kind() == backend.kind()) {
            Some(i) => self.backends[i] = backend,
            None => self.backends.push(backend),
        }
    }

    pub fn get(&self, kind: VcsKind) -> Option<Arc<dyn Backend>> {
        self.backends.iter().find(|b| b.kind() == kind).cloned()
    }

    pub fn kinds(&self) -> Vec<VcsKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    /// First backend whose `detect` accepts `path`
    pub fn detect(&self, path: &Path) -> Result<Arc<dyn Backend>> {
        self.backends
            .iter()
            .find(|b| b.detect(path))
            .cloned()
            .ok_or_else(|| ReleaseError::NoSuitableBackend {
                path: PathBuf::from(path),
            })
    }

    pub fn open(&self, path: &Path) -> Result<Box<dyn Vcs>> {
        let backend = self.detect(path)?;
        debug!(path = %path.display(), kind = %backend.kind(), "opening repository");
        backend.open(path)
    }

    /// Open with the backend of `kind`, detecting when that kind is not registered
    pub fn open_as(&self, kind: VcsKind, path: &Path) -> Result<Box<dyn Vcs>> {
        match self.get(kind) {
            Some(backend) => backend.open(path),
            None => self.open(path),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("backends", &self.kinds())
            .finish()
    }
}

/// Checks shared by the backends that detect a working copy by its metadata directory
pub(crate) fn has_metadata_dir(path: &Path, name: &str) -> bool {
    path.join(name).is_dir()
}

/// Fail with `NoSuitableBackend` unless `detect` accepts the path
pub(crate) fn ensure_detected(backend: &dyn Backend, path: &Path) -> Result<()> {
    if backend.detect(path) {
        Ok(())
    } else {
        Err(ReleaseError::NoSuitableBackend {
            path: path.to_path_buf(),
        })
    }
}
