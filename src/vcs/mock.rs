use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ReleaseError, Result};
use crate::vcs::options::*;
use crate::vcs::{Backend, Commit, Person, Vcs, VcsKind};

type CallHook = Box<dyn Fn(&Path, &str) + Send + Sync>;

/// One in-memory repository
#[derive(Debug, Clone, Default)]
pub struct MockRepo {
    /// Branch name to head commit hash
    pub branches: BTreeMap<String, String>,
    /// Commit hash to subject line
    pub commits: BTreeMap<String, String>,
    /// Tag name to commit hash
    pub tags: BTreeMap<String, String>,
    pub current: String,
    pub dirty: Vec<String>,
    pub staged: Vec<String>,
    /// Stash message and the files it holds, oldest first
    pub stashes: Vec<(String, Vec<String>)>,
    pub remotes: BTreeMap<String, String>,
    /// Merge sources that conflict with every destination
    pub conflicts: Vec<String>,
    pub authors: Vec<Person>,
    /// Mutating operations, in the order they ran
    pub calls: Vec<String>,
    next_commit: u32,
}

impl MockRepo {
    fn new_commit(&mut self, subject: impl Into<String>) -> String {
        self.next_commit += 1;
        let hash = format!("c{:04}", self.next_commit);
        self.commits.insert(hash.clone(), subject.into());
        hash
    }

    fn head(&self) -> Result<String> {
        self.branches
            .get(&self.current)
            .cloned()
            .ok_or_else(|| mock_failure(format!("no branch '{}'", self.current)))
    }

    /// Branch, tag or commit hash to commit hash
    fn resolve(&self, reference: &str) -> Result<String> {
        if let Some(hash) = self.branches.get(reference) {
            return Ok(hash.clone());
        }
        if let Some(hash) = self.tags.get(reference) {
            return Ok(hash.clone());
        }
        if self.commits.contains_key(reference) {
            return Ok(reference.to_string());
        }
        Err(mock_failure(format!("unknown revision '{}'", reference)))
    }
}

fn mock_failure(message: impl Into<String>) -> ReleaseError {
    ReleaseError::BackendOperationFailed {
        command: "mock".to_string(),
        code: Some(1),
        stderr: message.into(),
    }
}

#[derive(Default)]
struct MockState {
    repos: HashMap<PathBuf, MockRepo>,
    failures: Vec<String>,
}

/// Backend keeping repositories in memory, for testing without a real tool.
///
/// Every handle opened from one backend (or a clone of it) shares the same
/// state. Mutating operations are appended to the repository's call log as
/// the command line the git backend would have run, e.g. `checkout develop`
/// or `reset --hard c0003`.
#[derive(Clone)]
pub struct MockBackend {
    kind: VcsKind,
    state: Arc<Mutex<MockState>>,
    hooks: Arc<Mutex<Vec<CallHook>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_kind(VcsKind::Git)
    }

    pub fn with_kind(kind: VcsKind) -> Self {
        MockBackend {
            kind,
            state: Arc::new(Mutex::new(MockState::default())),
            hooks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a repository whose branches all point at one root commit
    pub fn init_repo(&self, path: &Path, branches: &[&str], current: &str) {
        let mut repo = MockRepo::default();
        let root = repo.new_commit("Initial commit");
        for branch in branches {
            repo.branches.insert(branch.to_string(), root.clone());
        }
        repo.current = current.to_string();
        self.lock().repos.insert(path.to_path_buf(), repo);
    }

    /// Direct access to a repository's state
    pub fn with_repo<T>(&self, path: &Path, f: impl FnOnce(&mut MockRepo) -> T) -> Option<T> {
        self.lock().repos.get_mut(path).map(f)
    }

    pub fn set_dirty(&self, path: &Path, files: &[&str]) {
        self.with_repo(path, |r| r.dirty = files.iter().map(|f| f.to_string()).collect());
    }

    pub fn add_remote(&self, path: &Path, name: &str, url: &str) {
        self.with_repo(path, |r| {
            r.remotes.insert(name.to_string(), url.to_string())
        });
    }

    /// Tag the current head without logging a call
    pub fn add_tag(&self, path: &Path, name: &str) {
        self.with_repo(path, |r| {
            if let Ok(head) = r.head() {
                r.tags.insert(name.to_string(), head);
            }
        });
    }

    /// Make merges of `source` conflict; the failed merge is aborted
    pub fn add_conflict(&self, path: &Path, source: &str) {
        self.with_repo(path, |r| r.conflicts.push(source.to_string()));
    }

    /// Make every operation whose command line starts with `prefix` fail
    pub fn fail_on(&self, prefix: &str) {
        self.lock().failures.push(prefix.to_string());
    }

    /// Run `hook` after every operation, outside the state lock
    pub fn on_call(&self, hook: impl Fn(&Path, &str) + Send + Sync + 'static) {
        self.hooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(hook));
    }

    pub fn calls(&self, path: &Path) -> Vec<String> {
        self.with_repo(path, |r| r.calls.clone()).unwrap_or_default()
    }

    pub fn current_branch(&self, path: &Path) -> Option<String> {
        self.with_repo(path, |r| r.current.clone())
    }

    pub fn branch_head(&self, path: &Path, branch: &str) -> Option<String> {
        self.with_repo(path, |r| r.branches.get(branch).cloned())
            .flatten()
    }

    pub fn branches(&self, path: &Path) -> Vec<String> {
        self.with_repo(path, |r| r.branches.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn tags(&self, path: &Path) -> Vec<String> {
        self.with_repo(path, |r| r.tags.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dirty(&self, path: &Path) -> Vec<String> {
        self.with_repo(path, |r| r.dirty.clone()).unwrap_or_default()
    }

    pub fn stash_count(&self, path: &Path) -> usize {
        self.with_repo(path, |r| r.stashes.len()).unwrap_or_default()
    }

    pub fn commit_subject(&self, path: &Path, hash: &str) -> Option<String> {
        self.with_repo(path, |r| r.commits.get(hash).cloned())
            .flatten()
    }

    fn handle(&self, path: &Path) -> MockVcs {
        MockVcs {
            path: path.to_path_buf(),
            backend: self.clone(),
        }
    }
}

impl Backend for MockBackend {
    fn kind(&self) -> VcsKind {
        self.kind
    }

    fn detect(&self, path: &Path) -> bool {
        self.lock().repos.contains_key(path)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Vcs>> {
        if !self.detect(path) {
            return Err(ReleaseError::NoSuitableBackend {
                path: path.to_path_buf(),
            });
        }
        Ok(Box::new(self.handle(path)))
    }

    fn initialize(&self, path: &Path, _opts: &InitOptions) -> Result<Box<dyn Vcs>> {
        self.init_repo(path, &["master"], "master");
        Ok(Box::new(self.handle(path)))
    }

    fn clone_repo(&self, url: &str, path: &Path, opts: &CloneOptions) -> Result<Box<dyn Vcs>> {
        let branch = opts.branch.as_deref().unwrap_or("master");
        self.init_repo(path, &[branch], branch);
        self.add_remote(path, "origin", url);
        Ok(Box::new(self.handle(path)))
    }
}

/// Handle on a [`MockRepo`]
pub struct MockVcs {
    path: PathBuf,
    backend: MockBackend,
}

impl MockVcs {
    /// Run `f` against the repository, logging `call` when `mutates` is set.
    fn call<T>(
        &self,
        call: &str,
        mutates: bool,
        f: impl FnOnce(&mut MockRepo) -> Result<T>,
    ) -> Result<T> {
        let result = {
            let mut state = self.backend.lock();
            let injected = state.failures.iter().any(|p| call.starts_with(p.as_str()));
            match state.repos.get_mut(&self.path) {
                None => Err(ReleaseError::NoSuitableBackend {
                    path: self.path.clone(),
                }),
                Some(repo) => {
                    if mutates {
                        repo.calls.push(call.to_string());
                    }
                    if injected {
                        Err(ReleaseError::BackendOperationFailed {
                            command: format!("mock {}", call),
                            code: Some(1),
                            stderr: "injected failure".to_string(),
                        })
                    } else {
                        f(repo)
                    }
                }
            }
        };
        let hooks = self.backend.hooks.lock().unwrap_or_else(|e| e.into_inner());
        for hook in hooks.iter() {
            hook(&self.path, call);
        }
        result
    }

    fn read<T>(&self, call: &str, f: impl FnOnce(&mut MockRepo) -> Result<T>) -> Result<T> {
        self.call(call, false, f)
    }

    fn write<T>(&self, call: &str, f: impl FnOnce(&mut MockRepo) -> Result<T>) -> Result<T> {
        self.call(call, true, f)
    }
}

impl Vcs for MockVcs {
    fn kind(&self) -> VcsKind {
        self.backend.kind
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn stage(&self, opts: &StageOptions) -> Result<()> {
        let call = if opts.all { "add --all" } else { "add" };
        self.write(call, |repo| {
            let files: Vec<String> = if opts.all || opts.tracked_only {
                std::mem::take(&mut repo.dirty)
            } else {
                repo.dirty.retain(|f| !opts.files.contains(f));
                opts.files.clone()
            };
            repo.staged.extend(files);
            Ok(())
        })
    }

    fn commit(&self, opts: &CommitOptions) -> Result<()> {
        self.write(&format!("commit -m {}", opts.message), |repo| {
            if opts.stage_tracked {
                let dirty = std::mem::take(&mut repo.dirty);
                repo.staged.extend(dirty);
            }
            if repo.staged.is_empty() && !opts.allow_empty {
                return Err(mock_failure("nothing to commit"));
            }
            repo.head()?;
            repo.staged.clear();
            let hash = repo.new_commit(opts.message.clone());
            let current = repo.current.clone();
            repo.branches.insert(current, hash);
            Ok(())
        })
    }

    fn status(&self, _opts: &StatusOptions) -> Result<Vec<String>> {
        self.read("status", |repo| {
            let mut lines: Vec<String> = repo.staged.iter().map(|f| format!("A {}", f)).collect();
            lines.extend(repo.dirty.iter().map(|f| format!("M {}", f)));
            Ok(lines)
        })
    }

    fn current_branch(&self) -> Result<String> {
        self.read("symbolic-ref HEAD", |repo| Ok(repo.current.clone()))
    }

    fn current_commit(&self, _opts: &CurrentCommitOptions) -> Result<Commit> {
        self.read("log -1", |repo| {
            let hash = repo.head()?;
            let subject = repo.commits.get(&hash).cloned().unwrap_or_default();
            Ok(Commit { hash, subject })
        })
    }

    fn extract_log(&self, opts: &ExtractLogOptions) -> Result<Vec<String>> {
        self.read("log", |repo| {
            let mut lines: Vec<String> = repo
                .commits
                .iter()
                .rev()
                .map(|(hash, subject)| format!("{} {}", hash, subject))
                .collect();
            if let Some(limit) = opts.limit {
                lines.truncate(limit);
            }
            Ok(lines)
        })
    }

    fn checkout(&self, branch: &str, opts: &CheckoutOptions) -> Result<()> {
        let call = match (&opts.create_branch, &opts.start_point) {
            (true, Some(start)) => format!("checkout -b {} {}", branch, start),
            (true, None) => format!("checkout -b {}", branch),
            (false, _) => format!("checkout {}", branch),
        };
        self.write(&call, |repo| {
            if opts.create_branch {
                if repo.branches.contains_key(branch) && !opts.reset_if_existing {
                    return Err(mock_failure(format!(
                        "a branch named '{}' already exists",
                        branch
                    )));
                }
                let start = match &opts.start_point {
                    Some(start) => repo.resolve(start)?,
                    None => repo.head()?,
                };
                repo.branches.insert(branch.to_string(), start);
            } else if !repo.branches.contains_key(branch) {
                return Err(mock_failure(format!(
                    "pathspec '{}' did not match any branch",
                    branch
                )));
            }
            repo.current = branch.to_string();
            Ok(())
        })
    }

    fn reset(&self, opts: &ResetOptions) -> Result<()> {
        let mut call = "reset".to_string();
        if opts.hard {
            call.push_str(" --hard");
        }
        if let Some(commit) = &opts.commit {
            call.push(' ');
            call.push_str(commit);
        }
        self.write(&call, |repo| {
            if let Some(commit) = &opts.commit {
                let hash = repo.resolve(commit)?;
                let current = repo.current.clone();
                repo.branches.insert(current, hash);
            }
            if opts.hard {
                repo.dirty.clear();
                repo.staged.clear();
            }
            Ok(())
        })
    }

    fn pull(&self, opts: &PullOptions) -> Result<()> {
        let call = if opts.tags_only { "fetch --tags" } else { "pull" };
        self.write(call, |repo| {
            if repo.remotes.is_empty() {
                return Err(mock_failure("no remote repository specified"));
            }
            Ok(())
        })
    }

    fn push(&self, _opts: &PushOptions) -> Result<()> {
        self.write("push", |repo| {
            if repo.remotes.is_empty() {
                return Err(mock_failure("no configured push destination"));
            }
            Ok(())
        })
    }

    fn tag(&self, name: &str, opts: &TagOptions) -> Result<()> {
        if opts.delete {
            return self.write(&format!("tag -d {}", name), |repo| {
                repo.tags
                    .remove(name)
                    .map(|_| ())
                    .ok_or_else(|| mock_failure(format!("tag '{}' not found", name)))
            });
        }
        self.write(&format!("tag -a {}", name), |repo| {
            if repo.tags.contains_key(name) {
                return Err(mock_failure(format!("tag '{}' already exists", name)));
            }
            let target = match &opts.commit {
                Some(commit) => repo.resolve(commit)?,
                None => repo.head()?,
            };
            repo.tags.insert(name.to_string(), target);
            Ok(())
        })
    }

    fn merge(&self, source: &str, dest: &str, opts: &MergeOptions) -> Result<()> {
        self.checkout(dest, &CheckoutOptions::default())?;
        let flag = if opts.no_fast_forward { "--no-ff " } else { "" };
        let merged = self.write(&format!("merge {}{}", flag, source), |repo| {
            repo.resolve(source)?;
            if repo.conflicts.iter().any(|c| c == source) {
                return Err(mock_failure(format!(
                    "CONFLICT (content): Merge conflict merging {}",
                    source
                )));
            }
            let subject = opts
                .message
                .clone()
                .unwrap_or_else(|| format!("Merge {} into {}", source, dest));
            let hash = repo.new_commit(subject);
            repo.branches.insert(dest.to_string(), hash);
            Ok(())
        });
        match merged {
            Ok(()) => Ok(()),
            Err(e) => {
                self.write("merge --abort", |_| Ok(())).ok();
                Err(e)
            }
        }
    }

    fn stash(&self, opts: &StashOptions) -> Result<Vec<String>> {
        match opts.action {
            StashAction::List => self.list_stashes(),
            StashAction::Save => {
                let message = opts.message.clone().unwrap_or_default();
                self.write(&format!("stash push -m {}", message), |repo| {
                    if repo.dirty.is_empty() && repo.staged.is_empty() {
                        return Ok(vec!["No local changes to save".to_string()]);
                    }
                    let mut files = std::mem::take(&mut repo.staged);
                    files.append(&mut repo.dirty);
                    repo.stashes.push((message.clone(), files));
                    Ok(vec![format!("Saved working directory: {}", message)])
                })
            }
            StashAction::Pop | StashAction::Apply => {
                let pop = opts.action == StashAction::Pop;
                let call = if pop { "stash pop" } else { "stash apply" };
                self.write(call, |repo| {
                    let entry = if pop {
                        repo.stashes.pop()
                    } else {
                        repo.stashes.last().cloned()
                    };
                    let (message, files) =
                        entry.ok_or_else(|| mock_failure("no stash entries found"))?;
                    repo.dirty.extend(files);
                    Ok(vec![format!("Restored {}", message)])
                })
            }
        }
    }

    fn list_stashes(&self) -> Result<Vec<String>> {
        self.read("stash list", |repo| {
            Ok(repo
                .stashes
                .iter()
                .rev()
                .enumerate()
                .map(|(i, (message, _))| format!("stash@{{{}}}: {}", i, message))
                .collect())
        })
    }

    fn delete_branch(&self, name: &str, opts: &DeleteBranchOptions) -> Result<()> {
        let flag = if opts.force { "-D" } else { "-d" };
        self.write(&format!("branch {} {}", flag, name), |repo| {
            if repo.current == name {
                return Err(mock_failure(format!(
                    "cannot delete branch '{}' checked out",
                    name
                )));
            }
            repo.branches
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| mock_failure(format!("branch '{}' not found", name)))
        })
    }

    fn list_branches(&self, _opts: &ListBranchesOptions) -> Result<Vec<String>> {
        self.read("branch", |repo| Ok(repo.branches.keys().cloned().collect()))
    }

    fn list_authors(&self, _opts: &ListAuthorsOptions) -> Result<Vec<Person>> {
        self.read("log authors", |repo| Ok(repo.authors.clone()))
    }

    fn list_remotes(&self, _opts: &ListRemotesOptions) -> Result<BTreeMap<String, String>> {
        self.read("remote -v", |repo| Ok(repo.remotes.clone()))
    }

    fn list_tags(&self, _opts: &ListTagsOptions) -> Result<Vec<String>> {
        self.read("tag --list", |repo| Ok(repo.tags.keys().cloned().collect()))
    }
}
