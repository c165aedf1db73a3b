use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::exec::{CommandOutput, CommandRunner, Invocation};
use crate::vcs::options::*;
use crate::vcs::{ensure_detected, Backend, Commit, Person, Vcs, VcsKind};

/// Git backend driving the `git` executable
pub struct GitBackend {
    runner: Arc<dyn CommandRunner>,
}

impl GitBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        GitBackend { runner }
    }
}

impl Backend for GitBackend {
    fn kind(&self) -> VcsKind {
        VcsKind::Git
    }

    /// A `.git` directory, or a `.git` file for linked worktrees
    fn detect(&self, path: &Path) -> bool {
        path.join(".git").exists()
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Vcs>> {
        ensure_detected(self, path)?;
        Ok(Box::new(GitRepo::new(path, self.runner.clone())))
    }

    fn initialize(&self, path: &Path, opts: &InitOptions) -> Result<Box<dyn Vcs>> {
        std::fs::create_dir_all(path)?;
        let mut inv = Invocation::new("git").arg("init");
        if opts.bare {
            inv = inv.arg("--bare");
        }
        self.runner.run(&inv.current_dir(path).mutating())?;
        Ok(Box::new(GitRepo::new(path, self.runner.clone())))
    }

    fn clone_repo(&self, url: &str, path: &Path, opts: &CloneOptions) -> Result<Box<dyn Vcs>> {
        let mut inv = Invocation::new("git");
        if opts.insecure {
            inv = inv.args(["-c", "http.sslVerify=false"]);
        }
        inv = inv.arg("clone");
        if let Some(branch) = &opts.branch {
            inv = inv.args(["--branch", branch.as_str()]);
        }
        let inv = inv
            .arg(url)
            .arg(path.to_string_lossy().into_owned())
            .mutating();
        self.runner.run(&inv)?;
        Ok(Box::new(GitRepo::new(path, self.runner.clone())))
    }
}

/// Handle on one git working copy
pub struct GitRepo {
    path: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl GitRepo {
    pub fn new(path: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        GitRepo {
            path: path.to_path_buf(),
            runner,
        }
    }

    fn git<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new("git").current_dir(&self.path).args(args)
    }

    fn query(&self, inv: Invocation) -> Result<CommandOutput> {
        self.runner.run(&inv)
    }

    fn mutate(&self, inv: Invocation) -> Result<CommandOutput> {
        self.runner.run(&inv.mutating())
    }
}

impl Vcs for GitRepo {
    fn kind(&self) -> VcsKind {
        VcsKind::Git
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn stage(&self, opts: &StageOptions) -> Result<()> {
        let mut inv = self.git(["add"]);
        if opts.all {
            inv = inv.arg("--all");
        } else if opts.tracked_only {
            inv = inv.arg("--update");
        }
        if !opts.files.is_empty() {
            inv = inv.arg("--").args(opts.files.iter().cloned());
        }
        self.mutate(inv)?;
        Ok(())
    }

    fn commit(&self, opts: &CommitOptions) -> Result<()> {
        let mut inv = self.git(["commit", "-m", opts.message.as_str()]);
        if opts.allow_empty {
            inv = inv.arg("--allow-empty");
        }
        if opts.signed {
            inv = inv.arg("-S");
        }
        if opts.stage_tracked {
            inv = inv.arg("--all");
        }
        self.mutate(inv)?;
        Ok(())
    }

    fn status(&self, opts: &StatusOptions) -> Result<Vec<String>> {
        let inv = if opts.short {
            self.git(["status", "--porcelain"])
        } else {
            self.git(["status", "--porcelain", "--untracked-files=all"])
        };
        Ok(self.query(inv)?.stdout)
    }

    fn current_branch(&self) -> Result<String> {
        let out = self.query(self.git(["symbolic-ref", "--short", "-q", "HEAD"]))?;
        Ok(out.first_line().to_string())
    }

    fn current_commit(&self, opts: &CurrentCommitOptions) -> Result<Commit> {
        let format = if opts.short_hash {
            "--format=%h%x09%s"
        } else {
            "--format=%H%x09%s"
        };
        let out = self.query(self.git(["log", "-1", format]))?;
        let line = out.first_line();
        let (hash, subject) = line.split_once('\t').unwrap_or((line, ""));
        Ok(Commit {
            hash: hash.trim().to_string(),
            subject: subject.trim().to_string(),
        })
    }

    fn extract_log(&self, opts: &ExtractLogOptions) -> Result<Vec<String>> {
        let mut inv = self.git(["log"]);
        if let Some(limit) = opts.limit {
            inv = inv.arg(format!("-n{}", limit));
        }
        let format = opts.format.as_deref().unwrap_or("%H %s");
        inv = inv.arg(format!("--format={}", format));
        if let Some(branch) = &opts.branch {
            inv = inv.arg(branch.as_str());
        }
        Ok(self.query(inv)?.stdout)
    }

    fn checkout(&self, branch: &str, opts: &CheckoutOptions) -> Result<()> {
        let mut inv = self.git(["checkout"]);
        if opts.create_branch {
            inv = inv.arg(if opts.reset_if_existing { "-B" } else { "-b" });
        }
        inv = inv.arg(branch);
        if let Some(start) = &opts.start_point {
            inv = inv.arg(start.as_str());
        }
        self.mutate(inv)?;
        Ok(())
    }

    fn reset(&self, opts: &ResetOptions) -> Result<()> {
        let mut inv = self.git(["reset"]);
        if opts.hard {
            inv = inv.arg("--hard");
        }
        if let Some(commit) = &opts.commit {
            inv = inv.arg(commit.as_str());
        }
        self.mutate(inv)?;
        Ok(())
    }

    fn pull(&self, opts: &PullOptions) -> Result<()> {
        let mut inv = if opts.tags_only {
            self.git(["fetch", "--tags"])
        } else {
            self.git(["pull"])
        };
        if opts.force {
            inv = inv.arg("--force");
        }
        if opts.all {
            inv = inv.arg("--all");
        }
        self.mutate(inv)?;
        Ok(())
    }

    fn push(&self, opts: &PushOptions) -> Result<()> {
        let mut inv = self.git(["push"]);
        if opts.force {
            inv = inv.arg("--force");
        }
        if opts.all {
            inv = inv.arg("--all");
        }
        if opts.tags {
            inv = inv.arg("--tags");
        }
        self.mutate(inv)?;
        Ok(())
    }

    fn tag(&self, name: &str, opts: &TagOptions) -> Result<()> {
        let inv = if opts.delete {
            self.git(["tag", "-d", name])
        } else {
            let mut inv = self.git(["tag"]);
            if opts.annotated {
                inv = inv.arg("-a");
            }
            if let Some(message) = &opts.message {
                inv = inv.args(["-m", message.as_str()]);
            }
            inv = inv.arg(name);
            if let Some(commit) = &opts.commit {
                inv = inv.arg(commit.as_str());
            }
            inv
        };
        self.mutate(inv)?;
        Ok(())
    }

    fn merge(&self, source: &str, dest: &str, opts: &MergeOptions) -> Result<()> {
        self.checkout(dest, &CheckoutOptions::default())?;
        let mut inv = self.git(["merge"]);
        if opts.no_fast_forward {
            inv = inv.arg("--no-ff");
        } else if opts.fast_forward_only {
            inv = inv.arg("--ff-only");
        }
        match &opts.message {
            Some(message) => inv = inv.args(["-m", message.as_str()]),
            None => inv = inv.arg("--no-edit"),
        }
        if let Err(e) = self.mutate(inv.arg(source)) {
            if let Err(abort) = self.mutate(self.git(["merge", "--abort"])) {
                warn!(error = %abort, "cannot abort failed merge");
            }
            return Err(e);
        }
        Ok(())
    }

    fn stash(&self, opts: &StashOptions) -> Result<Vec<String>> {
        let inv = match opts.action {
            StashAction::List => return self.list_stashes(),
            StashAction::Pop => self.git(["stash", "pop"]),
            StashAction::Apply => self.git(["stash", "apply"]),
            StashAction::Save => {
                let mut inv = self.git(["stash", "push"]);
                if opts.include_untracked {
                    inv = inv.arg("--include-untracked");
                }
                if let Some(message) = &opts.message {
                    inv = inv.args(["-m", message.as_str()]);
                }
                inv
            }
        };
        Ok(self.mutate(inv)?.stdout)
    }

    fn list_stashes(&self) -> Result<Vec<String>> {
        Ok(self.query(self.git(["stash", "list"]))?.stdout)
    }

    fn delete_branch(&self, name: &str, opts: &DeleteBranchOptions) -> Result<()> {
        let inv = match &opts.remote {
            Some(remote) => self.git(["push", remote.as_str(), "--delete", name]),
            None => self.git(["branch", if opts.force { "-D" } else { "-d" }, name]),
        };
        self.mutate(inv)?;
        Ok(())
    }

    fn list_branches(&self, opts: &ListBranchesOptions) -> Result<Vec<String>> {
        let mut inv = self.git(["branch", "--format=%(refname:short)"]);
        if opts.all {
            inv = inv.arg("--all");
        }
        Ok(self.query(inv)?.stdout)
    }

    fn list_authors(&self, opts: &ListAuthorsOptions) -> Result<Vec<Person>> {
        let mut inv = self.git(["log", "--format=%an <%ae>"]);
        if let Some(branch) = &opts.branch {
            inv = inv.arg(branch.as_str());
        }
        let mut authors: Vec<Person> = Vec::new();
        for line in self.query(inv)?.stdout {
            let person = Person::parse(&line);
            if !authors.contains(&person) {
                authors.push(person);
            }
        }
        Ok(authors)
    }

    fn list_remotes(&self, opts: &ListRemotesOptions) -> Result<BTreeMap<String, String>> {
        let wanted = if opts.push_urls { "(push)" } else { "(fetch)" };
        let mut remotes = BTreeMap::new();
        for line in self.query(self.git(["remote", "-v"]))?.stdout {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [name, url, direction] if *direction == wanted => {
                    remotes.insert(name.to_string(), url.to_string());
                }
                [name, url] => {
                    remotes.insert(name.to_string(), url.to_string());
                }
                _ => {}
            }
        }
        Ok(remotes)
    }

    fn list_tags(&self, opts: &ListTagsOptions) -> Result<Vec<String>> {
        let mut inv = self.git(["tag", "--list"]);
        if opts.sort_by_tagger_date {
            inv = inv.arg("--sort=taggerdate");
        } else if opts.sort_by_committer_date {
            inv = inv.arg("--sort=committerdate");
        }
        Ok(self.query(inv)?.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ScriptedRunner;

    fn repo() -> (Arc<ScriptedRunner>, GitRepo) {
        let runner = Arc::new(ScriptedRunner::new());
        let repo = GitRepo::new(Path::new("/work/api"), runner.clone());
        (runner, repo)
    }

    #[test]
    fn test_commands_run_in_repository() {
        let (runner, repo) = repo();
        repo.current_branch().unwrap();
        let invocations = runner.invocations();
        assert_eq!(invocations[0].cwd.as_deref(), Some(Path::new("/work/api")));
        assert!(!invocations[0].mutates);
    }

    #[test]
    fn test_checkout_new_branch_from_start_point() {
        let (runner, repo) = repo();
        repo.checkout(
            "release/1.5.0",
            &CheckoutOptions {
                create_branch: true,
                start_point: Some("develop".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec!["git checkout -b release/1.5.0 develop"]
        );
        assert!(runner.invocations()[0].mutates);
    }

    #[test]
    fn test_merge_checks_out_destination_first() {
        let (runner, repo) = repo();
        repo.merge(
            "release/1.5.0",
            "master",
            &MergeOptions {
                no_fast_forward: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "git checkout master",
                "git merge --no-ff --no-edit release/1.5.0"
            ]
        );
    }

    #[test]
    fn test_conflicting_merge_is_aborted() {
        let (runner, repo) = repo();
        runner.push_output([""; 0]);
        runner.push_failure(1, "CONFLICT (content): Merge conflict in notes.txt");
        let err = repo
            .merge("release/1.5.0", "master", &MergeOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("Merge conflict in notes.txt"));
        assert_eq!(
            runner.command_lines(),
            vec![
                "git checkout master",
                "git merge --no-edit release/1.5.0",
                "git merge --abort"
            ]
        );
    }

    #[test]
    fn test_annotated_tag_and_delete() {
        let (runner, repo) = repo();
        repo.tag(
            "1.5.0",
            &TagOptions {
                annotated: true,
                message: Some("Release 1.5.0".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        repo.tag(
            "1.5.0",
            &TagOptions {
                delete: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "git tag -a -m \"Release 1.5.0\" 1.5.0",
                "git tag -d 1.5.0"
            ]
        );
    }

    #[test]
    fn test_current_commit_splits_hash_and_subject() {
        let (runner, repo) = repo();
        runner.push_output(["3f2a9c1\tPrepare for next sprint: 1.5.0"]);
        let commit = repo
            .current_commit(&CurrentCommitOptions { short_hash: true })
            .unwrap();
        assert_eq!(commit.hash, "3f2a9c1");
        assert_eq!(commit.subject, "Prepare for next sprint: 1.5.0");
        assert_eq!(runner.command_lines(), vec!["git log -1 --format=%h%x09%s"]);
    }

    #[test]
    fn test_list_remotes_parses_fetch_urls() {
        let (runner, repo) = repo();
        runner.push_output([
            "origin\tgit@example.com:api.git (fetch)",
            "origin\tgit@example.com:api.git (push)",
            "mirror\thttps://mirror.example.com/api.git (fetch)",
            "mirror\tssh://push.example.com/api.git (push)",
        ]);
        let remotes = repo.list_remotes(&ListRemotesOptions::default()).unwrap();
        assert_eq!(remotes.len(), 2);
        assert_eq!(remotes["origin"], "git@example.com:api.git");
        assert_eq!(remotes["mirror"], "https://mirror.example.com/api.git");
    }

    #[test]
    fn test_stash_save_and_pop() {
        let (runner, repo) = repo();
        repo.stash(&StashOptions::save("release 1.5.0")).unwrap();
        repo.stash(&StashOptions::pop()).unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "git stash push --include-untracked -m \"release 1.5.0\"",
                "git stash pop"
            ]
        );
    }

    #[test]
    fn test_is_dirty_reads_porcelain_status() {
        let (runner, repo) = repo();
        runner.push_output([" M package.json"]);
        assert!(repo.is_dirty().unwrap());
        assert!(!repo.is_dirty().unwrap());
    }

    #[test]
    fn test_list_authors_deduplicates() {
        let (runner, repo) = repo();
        runner.push_output([
            "Ada <ada@example.com>",
            "Linus <linus@example.com>",
            "Ada <ada@example.com>",
        ]);
        let authors = repo.list_authors(&ListAuthorsOptions::default()).unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(authors[1].name, "Linus");
    }

    #[test]
    fn test_delete_branch_local_and_remote() {
        let (runner, repo) = repo();
        repo.delete_branch(
            "release/1.5.0",
            &DeleteBranchOptions {
                force: true,
                ..Default::default()
            },
        )
        .unwrap();
        repo.delete_branch(
            "release/1.5.0",
            &DeleteBranchOptions {
                remote: Some("origin".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "git branch -D release/1.5.0",
                "git push origin --delete release/1.5.0"
            ]
        );
    }

    #[test]
    fn test_failure_propagates() {
        let (runner, repo) = repo();
        runner.push_failure(1, "CONFLICT (content): Merge conflict in VERSION");
        let err = repo.reset(&ResetOptions {
            hard: true,
            commit: Some("abc123".to_string()),
        });
        assert!(matches!(
            err,
            Err(crate::error::ReleaseError::BackendOperationFailed { .. })
        ));
    }

    #[test]
    fn test_backend_open_requires_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        let backend = GitBackend::new(Arc::new(ScriptedRunner::new()));
        assert!(backend.open(dir.path()).is_err());
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        assert_eq!(backend.open(dir.path()).unwrap().kind(), VcsKind::Git);
    }
}
