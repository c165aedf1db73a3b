//! Option structs accepted by [`Vcs`](super::Vcs) operations.
//!
//! Every struct is `Default`, so callers spell out only what they need:
//!
//! ```rust
//! # use release_train::vcs::CheckoutOptions;
//! let opts = CheckoutOptions {
//!     create_branch: true,
//!     start_point: Some("develop".to_string()),
//!     ..Default::default()
//! };
//! # assert!(!opts.reset_if_existing);
//! ```

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub bare: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub branch: Option<String>,
    pub insecure: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    /// Stage every change in the working tree, untracked files included
    pub all: bool,
    /// Stage modifications of already tracked files only
    pub tracked_only: bool,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    pub message: String,
    pub allow_empty: bool,
    pub signed: bool,
    /// Stage tracked modifications as part of the commit
    pub stage_tracked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    pub short: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CurrentCommitOptions {
    pub short_hash: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractLogOptions {
    pub limit: Option<usize>,
    /// Backend specific format string; each backend has its own default
    pub format: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    pub create_branch: bool,
    /// Move the branch to the start point when it already exists
    pub reset_if_existing: bool,
    pub start_point: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ResetOptions {
    pub hard: bool,
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    pub force: bool,
    pub all: bool,
    /// Fetch tags instead of pulling the current branch
    pub tags_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub force: bool,
    pub all: bool,
    pub tags: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TagOptions {
    pub delete: bool,
    pub annotated: bool,
    pub message: Option<String>,
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub no_fast_forward: bool,
    pub fast_forward_only: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StashAction {
    #[default]
    Save,
    Pop,
    Apply,
    List,
}

#[derive(Debug, Clone, Default)]
pub struct StashOptions {
    pub action: StashAction,
    pub include_untracked: bool,
    pub message: Option<String>,
}

impl StashOptions {
    pub fn save(message: impl Into<String>) -> Self {
        StashOptions {
            action: StashAction::Save,
            include_untracked: true,
            message: Some(message.into()),
        }
    }

    pub fn pop() -> Self {
        StashOptions {
            action: StashAction::Pop,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeleteBranchOptions {
    /// Delete even when the branch is not merged
    pub force: bool,
    /// Delete the branch on this remote instead of locally
    pub remote: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListBranchesOptions {
    pub all: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListTagsOptions {
    pub sort_by_tagger_date: bool,
    pub sort_by_committer_date: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListAuthorsOptions {
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListRemotesOptions {
    /// Report push URLs instead of fetch URLs
    pub push_urls: bool,
}
