use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::error::{ReleaseError, Result};
use crate::exec::{CommandOutput, CommandRunner, Invocation};
use crate::vcs::options::*;
use crate::vcs::{ensure_detected, has_metadata_dir, Backend, Commit, Person, Vcs, VcsKind};

/// Mercurial backend driving the `hg` executable.
///
/// Stashing goes through the bundled `shelve` extension, enabled per
/// invocation so no user configuration is required.
pub struct HgBackend {
    runner: Arc<dyn CommandRunner>,
}

impl HgBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        HgBackend { runner }
    }
}

impl Backend for HgBackend {
    fn kind(&self) -> VcsKind {
        VcsKind::Hg
    }

    fn detect(&self, path: &Path) -> bool {
        has_metadata_dir(path, ".hg")
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Vcs>> {
        ensure_detected(self, path)?;
        Ok(Box::new(HgRepo::new(path, self.runner.clone())))
    }

    fn initialize(&self, path: &Path, _opts: &InitOptions) -> Result<Box<dyn Vcs>> {
        std::fs::create_dir_all(path)?;
        let inv = Invocation::new("hg")
            .arg("init")
            .current_dir(path)
            .mutating();
        self.runner.run(&inv)?;
        Ok(Box::new(HgRepo::new(path, self.runner.clone())))
    }

    fn clone_repo(&self, url: &str, path: &Path, opts: &CloneOptions) -> Result<Box<dyn Vcs>> {
        let mut inv = Invocation::new("hg").arg("clone");
        if opts.insecure {
            inv = inv.arg("--insecure");
        }
        if let Some(branch) = &opts.branch {
            inv = inv.args(["--branch", branch.as_str()]);
        }
        let inv = inv
            .arg(url)
            .arg(path.to_string_lossy().into_owned())
            .mutating();
        self.runner.run(&inv)?;
        Ok(Box::new(HgRepo::new(path, self.runner.clone())))
    }
}

/// Handle on one Mercurial working copy
pub struct HgRepo {
    path: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl HgRepo {
    pub fn new(path: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        HgRepo {
            path: path.to_path_buf(),
            runner,
        }
    }

    fn hg<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new("hg").current_dir(&self.path).args(args)
    }

    fn shelve<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hg(["--config", "extensions.shelve="]).args(args)
    }

    fn query(&self, inv: Invocation) -> Result<CommandOutput> {
        self.runner.run(&inv)
    }

    fn mutate(&self, inv: Invocation) -> Result<CommandOutput> {
        self.runner.run(&inv.mutating())
    }
}

impl Vcs for HgRepo {
    fn kind(&self) -> VcsKind {
        VcsKind::Hg
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn stage(&self, opts: &StageOptions) -> Result<()> {
        if opts.all {
            self.mutate(self.hg(["addremove"]))?;
        }
        // tracked modifications are always part of the next hg commit
        if !opts.files.is_empty() {
            self.mutate(self.hg(["add"]).args(opts.files.iter().cloned()))?;
        }
        Ok(())
    }

    fn commit(&self, opts: &CommitOptions) -> Result<()> {
        let mut inv = self.hg(Vec::<String>::new());
        if opts.allow_empty {
            inv = inv.args(["--config", "ui.allowemptycommit=True"]);
        }
        inv = inv.args(["commit", "-m", opts.message.as_str()]);
        self.mutate(inv)?;
        Ok(())
    }

    fn status(&self, _opts: &StatusOptions) -> Result<Vec<String>> {
        Ok(self.query(self.hg(["status"]))?.stdout)
    }

    fn current_branch(&self) -> Result<String> {
        Ok(self.query(self.hg(["branch"]))?.first_line().to_string())
    }

    fn current_commit(&self, opts: &CurrentCommitOptions) -> Result<Commit> {
        let template = if opts.short_hash {
            "{node|short}\t{desc|firstline}"
        } else {
            "{node}\t{desc|firstline}"
        };
        let out = self.query(self.hg(["log", "-r", ".", "--template", template]))?;
        let line = out.first_line();
        let (hash, subject) = line.split_once('\t').unwrap_or((line, ""));
        Ok(Commit {
            hash: hash.trim().to_string(),
            subject: subject.trim().to_string(),
        })
    }

    fn extract_log(&self, opts: &ExtractLogOptions) -> Result<Vec<String>> {
        let mut inv = self.hg(["log"]);
        if let Some(limit) = opts.limit {
            inv = inv.args(["-l".to_string(), limit.to_string()]);
        }
        if let Some(branch) = &opts.branch {
            inv = inv.args(["-b", branch.as_str()]);
        }
        let template = opts
            .format
            .clone()
            .unwrap_or_else(|| "{node} {desc|firstline}\\n".to_string());
        inv = inv.arg("--template").arg(template);
        Ok(self.query(inv)?.stdout)
    }

    /// Named branches only come into existence with their first commit, so a
    /// new branch is committed right away
    fn checkout(&self, branch: &str, opts: &CheckoutOptions) -> Result<()> {
        if !opts.create_branch {
            self.mutate(self.hg(["update", branch]))?;
            return Ok(());
        }
        if let Some(start) = &opts.start_point {
            self.mutate(self.hg(["update", start.as_str()]))?;
        }
        let mut inv = self.hg(["branch"]);
        if opts.reset_if_existing {
            inv = inv.arg("--force");
        }
        self.mutate(inv.arg(branch))?;
        let message = format!("Start branch {}", branch);
        self.mutate(self.hg(["commit", "-m", message.as_str()]))?;
        Ok(())
    }

    fn reset(&self, opts: &ResetOptions) -> Result<()> {
        let mut inv = self.hg(["update"]);
        if opts.hard {
            inv = inv.arg("--clean");
        }
        if let Some(commit) = &opts.commit {
            inv = inv.args(["-r", commit.as_str()]);
        }
        self.mutate(inv)?;
        Ok(())
    }

    fn pull(&self, opts: &PullOptions) -> Result<()> {
        let mut inv = self.hg(["pull"]);
        if !opts.tags_only {
            inv = inv.arg("--update");
        }
        if opts.force {
            inv = inv.arg("--force");
        }
        self.mutate(inv)?;
        Ok(())
    }

    fn push(&self, opts: &PushOptions) -> Result<()> {
        let mut inv = self.hg(["push"]);
        if opts.force {
            inv = inv.arg("--force");
        }
        if opts.all {
            inv = inv.arg("--new-branch");
        }
        self.mutate(inv)?;
        Ok(())
    }

    fn tag(&self, name: &str, opts: &TagOptions) -> Result<()> {
        let mut inv = self.hg(["tag"]);
        if opts.delete {
            inv = inv.arg("--remove");
        } else {
            if let Some(message) = &opts.message {
                inv = inv.args(["-m", message.as_str()]);
            }
            if let Some(commit) = &opts.commit {
                inv = inv.args(["-r", commit.as_str()]);
            }
        }
        self.mutate(inv.arg(name))?;
        Ok(())
    }

    /// hg merges always produce a commit, so fast-forward options do not apply
    fn merge(&self, source: &str, dest: &str, opts: &MergeOptions) -> Result<()> {
        self.mutate(self.hg(["update", dest]))?;
        if let Err(e) = self.mutate(self.hg(["merge", source])) {
            if let Err(clean) = self.mutate(self.hg(["update", "--clean", "."])) {
                warn!(error = %clean, "cannot discard failed merge");
            }
            return Err(e);
        }
        let message = opts
            .message
            .clone()
            .unwrap_or_else(|| format!("Merge {} into {}", source, dest));
        self.mutate(self.hg(["commit", "-m", message.as_str()]))?;
        Ok(())
    }

    fn stash(&self, opts: &StashOptions) -> Result<Vec<String>> {
        let inv = match opts.action {
            StashAction::List => return self.list_stashes(),
            StashAction::Pop => self.shelve(["unshelve"]),
            StashAction::Apply => self.shelve(["unshelve", "--keep"]),
            StashAction::Save => {
                let mut inv = self.shelve(["shelve"]);
                if opts.include_untracked {
                    inv = inv.arg("--unknown");
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
        Ok(self.query(self.shelve(["shelve", "--list"]))?.stdout)
    }

    /// Closes the branch with a commit, then returns to the previous branch
    fn delete_branch(&self, name: &str, opts: &DeleteBranchOptions) -> Result<()> {
        if opts.remote.is_some() {
            return Err(ReleaseError::Unsupported {
                backend: "hg",
                operation: "delete remote branch",
            });
        }
        let previous = self.current_branch()?;
        self.mutate(self.hg(["update", name]))?;
        let message = format!("Close branch {}", name);
        self.mutate(self.hg(["commit", "--close-branch", "-m", message.as_str()]))?;
        if previous != name {
            self.mutate(self.hg(["update", previous.as_str()]))?;
        }
        Ok(())
    }

    fn list_branches(&self, opts: &ListBranchesOptions) -> Result<Vec<String>> {
        let mut inv = self.hg(["branches", "--quiet"]);
        if opts.all {
            inv = inv.arg("--closed");
        }
        Ok(self.query(inv)?.stdout)
    }

    fn list_authors(&self, opts: &ListAuthorsOptions) -> Result<Vec<Person>> {
        let mut inv = self.hg(["log", "--template", "{author}\\n"]);
        if let Some(branch) = &opts.branch {
            inv = inv.args(["-b", branch.as_str()]);
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

    fn list_remotes(&self, _opts: &ListRemotesOptions) -> Result<BTreeMap<String, String>> {
        let mut remotes = BTreeMap::new();
        for line in self.query(self.hg(["paths"]))?.stdout {
            if let Some((name, url)) = line.split_once(" = ") {
                remotes.insert(name.trim().to_string(), url.trim().to_string());
            }
        }
        Ok(remotes)
    }

    fn list_tags(&self, _opts: &ListTagsOptions) -> Result<Vec<String>> {
        let out = self.query(self.hg(["tags", "--quiet"]))?;
        Ok(out.stdout.into_iter().filter(|t| t != "tip").collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ScriptedRunner;

    fn repo() -> (Arc<ScriptedRunner>, HgRepo) {
        let runner = Arc::new(ScriptedRunner::new());
        let repo = HgRepo::new(Path::new("/work/hg-api"), runner.clone());
        (runner, repo)
    }

    #[test]
    fn test_create_branch_updates_then_names_branch() {
        let (runner, repo) = repo();
        repo.checkout(
            "release/2.0.0",
            &CheckoutOptions {
                create_branch: true,
                start_point: Some("default".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "hg update default",
                "hg branch release/2.0.0",
                "hg commit -m \"Start branch release/2.0.0\""
            ]
        );
    }

    #[test]
    fn test_hard_reset_is_clean_update() {
        let (runner, repo) = repo();
        repo.reset(&ResetOptions {
            hard: true,
            commit: Some("a1b2c3".to_string()),
        })
        .unwrap();
        assert_eq!(runner.command_lines(), vec!["hg update --clean -r a1b2c3"]);
    }

    #[test]
    fn test_stash_uses_shelve_extension() {
        let (runner, repo) = repo();
        repo.stash(&StashOptions::save("wip")).unwrap();
        repo.stash(&StashOptions::pop()).unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "hg --config extensions.shelve= shelve --unknown -m wip",
                "hg --config extensions.shelve= unshelve"
            ]
        );
    }

    #[test]
    fn test_merge_commits_result() {
        let (runner, repo) = repo();
        repo.merge("release/2.0.0", "stable", &MergeOptions::default())
            .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "hg update stable",
                "hg merge release/2.0.0",
                "hg commit -m \"Merge release/2.0.0 into stable\""
            ]
        );
    }

    #[test]
    fn test_failed_merge_discards_working_copy() {
        let (runner, repo) = repo();
        runner.push_output([""; 0]);
        runner.push_failure(1, "merging notes.txt failed!");
        let err = repo
            .merge("release/2.0.0", "stable", &MergeOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("merging notes.txt failed!"));
        assert_eq!(
            runner.command_lines(),
            vec![
                "hg update stable",
                "hg merge release/2.0.0",
                "hg update --clean ."
            ]
        );
    }

    #[test]
    fn test_list_tags_hides_tip() {
        let (runner, repo) = repo();
        runner.push_output(["tip", "1.1.0", "1.0.0"]);
        let tags = repo.list_tags(&ListTagsOptions::default()).unwrap();
        assert_eq!(tags, vec!["1.1.0", "1.0.0"]);
    }

    #[test]
    fn test_list_remotes_parses_paths() {
        let (runner, repo) = repo();
        runner.push_output(["default = https://hg.example.com/api"]);
        let remotes = repo.list_remotes(&ListRemotesOptions::default()).unwrap();
        assert_eq!(remotes["default"], "https://hg.example.com/api");
    }

    #[test]
    fn test_delete_branch_closes_it() {
        let (runner, repo) = repo();
        runner.push_output(["default"]);
        repo.delete_branch("release/2.0.0", &DeleteBranchOptions::default())
            .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "hg branch",
                "hg update release/2.0.0",
                "hg commit --close-branch -m \"Close branch release/2.0.0\"",
                "hg update default"
            ]
        );
    }

    #[test]
    fn test_remote_branch_delete_unsupported() {
        let (_, repo) = repo();
        let err = repo
            .delete_branch(
                "x",
                &DeleteBranchOptions {
                    remote: Some("default".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Unsupported { backend: "hg", .. }));
    }
}
