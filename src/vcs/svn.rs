use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ReleaseError, Result};
use crate::exec::{CommandOutput, CommandRunner, Invocation};
use crate::vcs::options::*;
use crate::vcs::{ensure_detected, has_metadata_dir, Backend, Commit, Person, Vcs, VcsKind};

const TRUNK: &str = "trunk";

/// Subversion backend driving the `svn` executable.
///
/// Branches and tags live in the conventional `trunk`, `branches/` and
/// `tags/` layout and are addressed relative to the repository root (`^/`).
pub struct SvnBackend {
    runner: Arc<dyn CommandRunner>,
}

impl SvnBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        SvnBackend { runner }
    }
}

impl Backend for SvnBackend {
    fn kind(&self) -> VcsKind {
        VcsKind::Svn
    }

    fn detect(&self, path: &Path) -> bool {
        has_metadata_dir(path, ".svn")
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Vcs>> {
        ensure_detected(self, path)?;
        Ok(Box::new(SvnRepo::new(path, self.runner.clone())))
    }

    /// Repositories are created server side with `svnadmin`
    fn initialize(&self, _path: &Path, _opts: &InitOptions) -> Result<Box<dyn Vcs>> {
        Err(ReleaseError::Unsupported {
            backend: "svn",
            operation: "initialize",
        })
    }

    fn clone_repo(&self, url: &str, path: &Path, opts: &CloneOptions) -> Result<Box<dyn Vcs>> {
        let mut inv = Invocation::new("svn").arg("checkout");
        if opts.insecure {
            inv = inv.arg("--trust-server-cert");
        }
        let source = match &opts.branch {
            Some(branch) => format!("{}/{}", url.trim_end_matches('/'), branch_path(branch)),
            None => url.to_string(),
        };
        let inv = inv
            .arg(source)
            .arg(path.to_string_lossy().into_owned())
            .mutating();
        self.runner.run(&inv)?;
        Ok(Box::new(SvnRepo::new(path, self.runner.clone())))
    }
}

/// Location of a branch relative to the repository root
fn branch_path(name: &str) -> String {
    if name == TRUNK || name.starts_with("branches/") || name.starts_with("tags/") {
        name.to_string()
    } else {
        format!("branches/{}", name)
    }
}

/// Handle on one Subversion working copy
pub struct SvnRepo {
    path: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl SvnRepo {
    pub fn new(path: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        SvnRepo {
            path: path.to_path_buf(),
            runner,
        }
    }

    fn svn<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new("svn")
            .current_dir(&self.path)
            .arg("--non-interactive")
            .args(args)
    }

    fn query(&self, inv: Invocation) -> Result<CommandOutput> {
        self.runner.run(&inv)
    }

    fn mutate(&self, inv: Invocation) -> Result<CommandOutput> {
        self.runner.run(&inv.mutating())
    }

    fn branch_url(&self, name: &str) -> String {
        format!("^/{}", branch_path(name))
    }

    /// URL of `name`, preferring an existing tag over a branch
    fn ref_url(&self, name: &str) -> Result<String> {
        if self.has_tag(name)? {
            Ok(format!("^/tags/{}", name))
        } else {
            Ok(self.branch_url(name))
        }
    }
}

impl Vcs for SvnRepo {
    fn kind(&self) -> VcsKind {
        VcsKind::Svn
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn stage(&self, opts: &StageOptions) -> Result<()> {
        if opts.all {
            self.mutate(self.svn(["add", "--force", "."]))?;
        }
        if !opts.files.is_empty() {
            self.mutate(self.svn(["add"]).args(opts.files.iter().cloned()))?;
        }
        Ok(())
    }

    fn commit(&self, opts: &CommitOptions) -> Result<()> {
        self.mutate(self.svn(["commit", "-m", opts.message.as_str()]))?;
        Ok(())
    }

    fn status(&self, _opts: &StatusOptions) -> Result<Vec<String>> {
        Ok(self.query(self.svn(["status"]))?.stdout)
    }

    fn current_branch(&self) -> Result<String> {
        let out = self.query(self.svn(["info", "--show-item", "relative-url"]))?;
        let url = out.first_line().trim_start_matches("^/");
        let name = url.strip_prefix("branches/").unwrap_or(url);
        Ok(name.to_string())
    }

    /// Commit hash is the last changed revision number
    fn current_commit(&self, _opts: &CurrentCommitOptions) -> Result<Commit> {
        let out = self.query(self.svn(["log", "-l", "1", "-r", "BASE:1"]))?;
        let mut lines = out.stdout.iter().filter(|l| !l.starts_with("----"));
        let header = lines.next().map(|s| s.as_str()).unwrap_or_default();
        let revision = header
            .split(" | ")
            .next()
            .unwrap_or_default()
            .trim_start_matches('r')
            .to_string();
        let subject = lines.next().cloned().unwrap_or_default();
        Ok(Commit {
            hash: revision,
            subject,
        })
    }

    fn extract_log(&self, opts: &ExtractLogOptions) -> Result<Vec<String>> {
        let mut inv = self.svn(["log"]);
        if let Some(limit) = opts.limit {
            inv = inv.args(["-l".to_string(), limit.to_string()]);
        }
        if let Some(branch) = &opts.branch {
            inv = inv.arg(self.branch_url(branch));
        }
        Ok(self.query(inv)?.stdout)
    }

    fn checkout(&self, branch: &str, opts: &CheckoutOptions) -> Result<()> {
        let target = self.branch_url(branch);
        if opts.create_branch {
            let source = match &opts.start_point {
                Some(start) => self.branch_url(start),
                None => self.branch_url(&self.current_branch()?),
            };
            let message = format!("Create branch {}", branch);
            self.mutate(self.svn([
                "copy",
                source.as_str(),
                target.as_str(),
                "-m",
                message.as_str(),
            ]))?;
        }
        self.mutate(self.svn(["switch", target.as_str()]))?;
        Ok(())
    }

    fn reset(&self, opts: &ResetOptions) -> Result<()> {
        if opts.hard {
            self.mutate(self.svn(["revert", "--recursive", "."]))?;
        }
        if let Some(commit) = &opts.commit {
            self.mutate(self.svn(["update", "-r", commit.as_str()]))?;
        }
        Ok(())
    }

    fn pull(&self, _opts: &PullOptions) -> Result<()> {
        self.mutate(self.svn(["update"]))?;
        Ok(())
    }

    /// Commits are already on the server
    fn push(&self, _opts: &PushOptions) -> Result<()> {
        Ok(())
    }

    fn tag(&self, name: &str, opts: &TagOptions) -> Result<()> {
        let target = format!("^/tags/{}", name);
        if opts.delete {
            let message = format!("Delete tag {}", name);
            self.mutate(self.svn(["delete", target.as_str(), "-m", message.as_str()]))?;
            return Ok(());
        }
        let source = self.branch_url(&self.current_branch()?);
        let message = opts
            .message
            .clone()
            .unwrap_or_else(|| format!("Tag {}", name));
        let mut inv = self.svn(["copy"]);
        if let Some(commit) = &opts.commit {
            inv = inv.args(["-r", commit.as_str()]);
        }
        self.mutate(inv.args([source.as_str(), target.as_str(), "-m", message.as_str()]))?;
        Ok(())
    }

    fn merge(&self, source: &str, dest: &str, opts: &MergeOptions) -> Result<()> {
        let source_url = self.ref_url(source)?;
        self.checkout(dest, &CheckoutOptions::default())?;
        self.mutate(self.svn(["merge", source_url.as_str()]))?;
        let message = opts
            .message
            .clone()
            .unwrap_or_else(|| format!("Merge {} into {}", source, dest));
        self.mutate(self.svn(["commit", "-m", message.as_str()]))?;
        Ok(())
    }

    fn stash(&self, opts: &StashOptions) -> Result<Vec<String>> {
        match opts.action {
            StashAction::List => self.list_stashes(),
            _ => Err(ReleaseError::Unsupported {
                backend: "svn",
                operation: "stash",
            }),
        }
    }

    fn list_stashes(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn delete_branch(&self, name: &str, _opts: &DeleteBranchOptions) -> Result<()> {
        let target = self.branch_url(name);
        let message = format!("Delete branch {}", name);
        self.mutate(self.svn(["delete", target.as_str(), "-m", message.as_str()]))?;
        Ok(())
    }

    fn list_branches(&self, _opts: &ListBranchesOptions) -> Result<Vec<String>> {
        let mut branches = vec![TRUNK.to_string()];
        let out = self.query(self.svn(["list", "^/branches"]))?;
        branches.extend(out.stdout.iter().map(|b| b.trim_end_matches('/').to_string()));
        Ok(branches)
    }

    fn list_authors(&self, opts: &ListAuthorsOptions) -> Result<Vec<Person>> {
        let mut inv = self.svn(["log", "--quiet"]);
        if let Some(branch) = &opts.branch {
            inv = inv.arg(self.branch_url(branch));
        }
        let mut authors: Vec<Person> = Vec::new();
        for line in self.query(inv)?.stdout {
            let mut fields = line.split(" | ");
            if let (Some(rev), Some(author)) = (fields.next(), fields.next()) {
                if !rev.starts_with('r') {
                    continue;
                }
                let person = Person::parse(author);
                if !authors.contains(&person) {
                    authors.push(person);
                }
            }
        }
        Ok(authors)
    }

    fn list_remotes(&self, _opts: &ListRemotesOptions) -> Result<BTreeMap<String, String>> {
        let out = self.query(self.svn(["info", "--show-item", "repos-root-url"]))?;
        let mut remotes = BTreeMap::new();
        if !out.first_line().is_empty() {
            remotes.insert("origin".to_string(), out.first_line().to_string());
        }
        Ok(remotes)
    }

    fn list_tags(&self, _opts: &ListTagsOptions) -> Result<Vec<String>> {
        let out = self.query(self.svn(["list", "^/tags"]))?;
        Ok(out
            .stdout
            .iter()
            .map(|t| t.trim_end_matches('/').to_string())
            .collect())
    }
}
