//! The per-project release workflow.
//!
//! A [`Release`] walks one repository through the git-flow style sequence:
//! stash local changes, update the long-lived branches, cut a release
//! branch, merge it into production, tag, merge the tag back into
//! development and bump the development manifest. Every mutation is
//! journaled the moment it succeeds so that [`Release::rollback`] can undo
//! exactly what happened.

pub mod context;
pub mod journal;
pub mod record;
pub mod train;
pub mod undo;

pub use context::{Context, State};
pub use journal::Journal;
pub use record::ReleaseRecord;
pub use train::{ReleaseTrain, TrainReport};
pub use undo::{UndoAction, UndoKind};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, info_span, warn};

use crate::config::{BranchNames, SprintVersion, VersionSource, Workspace};
use crate::error::{ReleaseError, Result};
use crate::exec::{CommandRunner, SystemRunner};
use crate::project::{self, Project, ProjectAccessor};
use crate::session::Session;
use crate::ui::{AutoGate, ConfirmationGate};
use crate::vcs::{self, MockBackend, Vcs};
use crate::vcs::{
    CheckoutOptions, CommitOptions, CurrentCommitOptions, DeleteBranchOptions, ListRemotesOptions,
    ListTagsOptions, MergeOptions, PullOptions, StageOptions, StashOptions, StatusOptions,
    TagOptions,
};
use crate::version::{Version, VersionPart, DEFAULT_PRE_RELEASE_PREFIX};

use self::undo::params;

/// Collaborators shared by every release of a run
#[derive(Clone)]
pub struct Toolkit {
    pub vcs: vcs::Registry,
    pub manifests: project::Registry,
    pub gate: Arc<dyn ConfirmationGate>,
}

impl Toolkit {
    /// Real backends and manifests, honouring the session's dry-run flag
    pub fn system(session: &Session, gate: Arc<dyn ConfirmationGate>) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(session.dry_run));
        Toolkit {
            vcs: vcs::Registry::with_defaults(runner),
            manifests: project::Registry::with_defaults(session.dry_run),
            gate,
        }
    }

    /// In-memory repositories with real manifest files; every gate says yes
    pub fn mock(backend: MockBackend) -> Self {
        let mut registry = vcs::Registry::new();
        registry.register(Arc::new(backend));
        Toolkit {
            vcs: registry,
            manifests: project::Registry::with_defaults(false),
            gate: Arc::new(AutoGate(true)),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.gate = gate;
        self
    }
}

impl fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolkit")
            .field("vcs", &self.vcs)
            .field("manifests", &self.manifests)
            .finish()
    }
}

/// Workspace policies a release needs
#[derive(Debug, Clone)]
pub struct ReleaseSettings {
    pub acquire_version_from: VersionSource,
    pub sprint_version: SprintVersion,
    pub branch_names: BranchNames,
    pub pre_release_prefix: String,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        ReleaseSettings {
            acquire_version_from: VersionSource::default(),
            sprint_version: SprintVersion::default(),
            branch_names: BranchNames::default(),
            pre_release_prefix: DEFAULT_PRE_RELEASE_PREFIX.to_string(),
        }
    }
}

impl From<&Workspace> for ReleaseSettings {
    fn from(workspace: &Workspace) -> Self {
        ReleaseSettings {
            acquire_version_from: workspace.acquire_version_from,
            sprint_version: workspace.sprint_version,
            branch_names: workspace.branch_names.clone(),
            pre_release_prefix: workspace.versioning.pre_release_prefix.clone(),
        }
    }
}

/// One project's release
pub struct Release {
    pub project: Project,
    pub context: Context,
    pub journal: Journal,
    vcs: Box<dyn Vcs>,
    manifest: Box<dyn ProjectAccessor>,
    settings: ReleaseSettings,
    tools: Toolkit,
    session: Session,
}

impl Release {
    /// Open the project's repository and manifest
    pub fn new(
        project: Project,
        settings: ReleaseSettings,
        tools: Toolkit,
        session: Session,
    ) -> Result<Self> {
        let vcs = tools.vcs.open(&project.path)?;
        if let Some(declared) = project.vcs {
            if declared != vcs.kind() {
                warn!(
                    project = %project.name,
                    declared = %declared,
                    detected = %vcs.kind(),
                    "declared version control differs from the detected one"
                );
            }
        }
        let manifest = tools.manifests.open(&project.path)?;
        let context = Context::new(
            settings.branch_names.development.clone(),
            settings.branch_names.production.clone(),
        );
        Ok(Release {
            project,
            context,
            journal: Journal::new(),
            vcs,
            manifest,
            settings,
            tools,
            session,
        })
    }

    pub fn name(&self) -> &str {
        &self.project.name
    }

    /// Read the current version and work out every name the release
    /// will use. Touches nothing in the repository.
    pub fn prepare_context(&mut self, release_type: VersionPart) -> Result<()> {
        if !self.context.state.is_created() || self.context.is_prepared() {
            return Err(ReleaseError::invalid_state(format!(
                "release of '{}' is already prepared",
                self.project.name
            )));
        }
        let span = info_span!("release", project = %self.project.name);
        let _enter = span.enter();

        let remotes = self.vcs.list_remotes(&ListRemotesOptions::default())?;
        let version = self.acquire_version()?;
        let starting_branch = self.vcs.current_branch()?;
        let prefix = self.settings.pre_release_prefix.as_str();
        let next_version = version.bumped(release_type, 1, prefix)?;
        let sprint_version = match self.settings.sprint_version {
            SprintVersion::Released => next_version.clone(),
            SprintVersion::Next => next_version.bumped(release_type, 1, prefix)?,
        };

        let tag = next_version.to_string();
        if self.vcs.has_tag(&tag)? {
            return Err(ReleaseError::AlreadyTagged(tag));
        }

        self.context.date = Utc::now();
        self.context.has_remotes = !remotes.is_empty();
        self.context.release_branch =
            context::render_branch(&self.settings.branch_names.release, &next_version);
        self.context.old_branch = starting_branch.clone();
        self.context.starting_branch = starting_branch;
        info!(
            version = %version,
            next = %next_version,
            sprint = %sprint_version,
            branch = %self.context.release_branch,
            "prepared"
        );
        self.context.version = Some(version);
        self.context.next_version = Some(next_version);
        self.context.sprint_version = Some(sprint_version);
        Ok(())
    }

    fn acquire_version(&self) -> Result<Version> {
        match self.settings.acquire_version_from {
            VersionSource::Manifest => self.manifest.read_version(),
            VersionSource::Tags => {
                let tags = self.vcs.list_tags(&ListTagsOptions::default())?;
                let tag = latest_tag(&tags).ok_or(ReleaseError::NoTags)?;
                debug!(tag = %tag, "latest tag");
                Version::parse(tag)
            }
        }
    }

    /// Run the whole workflow. On error the journal holds exactly the
    /// mutations that were performed.
    pub fn run(&mut self) -> Result<()> {
        if !self.context.is_prepared() {
            return Err(ReleaseError::invalid_state(format!(
                "release of '{}' was not prepared",
                self.project.name
            )));
        }
        if !self.context.state.is_created() {
            return Err(ReleaseError::invalid_state(format!(
                "release of '{}' has already started ({})",
                self.project.name, self.context.state
            )));
        }
        let span = info_span!("release", project = %self.project.name);
        let _enter = span.enter();

        self.context.state.insert(State::STARTED);
        self.stash_modifications()?;
        self.update_repository()?;
        self.release_start()?;
        self.wait_user_to_confirm()?;
        self.release_finish()?;
        self.prepare_for_next_sprint()?;
        self.context.state.insert(State::FINISHED);
        info!("release finished");
        Ok(())
    }

    /// Undo everything journaled so far, newest first
    pub fn rollback(&mut self) -> Result<()> {
        let span = info_span!("rollback", project = %self.project.name);
        let _enter = span.enter();
        self.journal.rollback(&self.tools)
    }

    fn checkpoint(&self) -> Result<()> {
        self.session.cancel.check()
    }

    fn next_version(&self) -> Result<&Version> {
        self.context
            .next_version
            .as_ref()
            .ok_or_else(|| ReleaseError::invalid_state("no release version"))
    }

    fn record_undo(&mut self, kind: UndoKind, params: BTreeMap<String, String>) -> Result<()> {
        self.journal.record(
            kind,
            &self.project.path,
            self.vcs.kind(),
            params,
            &self.tools,
        )
    }

    fn head(&self) -> Result<String> {
        Ok(self
            .vcs
            .current_commit(&CurrentCommitOptions { short_hash: false })?
            .hash)
    }

    fn stash_modifications(&mut self) -> Result<()> {
        info!("stash modifications");
        let status = self.vcs.status(&StatusOptions { short: true })?;
        if status.is_empty() {
            debug!("working tree is clean");
            return Ok(());
        }
        let name = format!(
            "Before release {}, on branch {}",
            self.next_version()?,
            self.context.starting_branch
        );
        self.checkpoint()?;
        self.vcs.stash(&StashOptions::save(name.clone()))?;
        self.record_undo(UndoKind::StashSave, params([("name", &name)]))
    }

    fn checkout_branch(&mut self, branch: &str) -> Result<()> {
        self.checkpoint()?;
        let old = self.vcs.current_branch()?;
        self.vcs.checkout(branch, &CheckoutOptions::default())?;
        self.context.old_branch = old.clone();
        self.record_undo(
            UndoKind::Checkout,
            params([("oldBranch", &old), ("newBranch", branch)]),
        )
    }

    fn pull_branch(&mut self) -> Result<()> {
        self.checkpoint()?;
        let branch = self.vcs.current_branch()?;
        let prev = self.head()?;
        self.vcs.pull(&PullOptions::default())?;
        let next = self.head()?;
        self.record_undo(
            UndoKind::PullBranch,
            params([("branch", &branch), ("prevHead", &prev), ("nextHead", &next)]),
        )
    }

    fn update_branch(&mut self, branch: &str) -> Result<()> {
        self.checkout_branch(branch)?;
        if self.context.has_remotes {
            self.pull_branch()?;
        }
        Ok(())
    }

    fn update_repository(&mut self) -> Result<()> {
        info!("update repository");
        let prod = self.context.prod_branch.clone();
        let dev = self.context.dev_branch.clone();
        self.update_branch(&prod)?;
        self.update_branch(&dev)?;
        if self.context.has_remotes {
            self.checkpoint()?;
            self.vcs.pull(&PullOptions {
                force: true,
                tags_only: true,
                ..Default::default()
            })?;
        }
        Ok(())
    }

    fn release_start(&mut self) -> Result<()> {
        info!("start release");
        self.context.state.insert(State::START_STARTED);
        let release = self.context.release_branch.clone();
        let dev = self.context.dev_branch.clone();
        self.checkpoint()?;
        let old = self.vcs.current_branch()?;
        self.vcs.checkout(
            &release,
            &CheckoutOptions {
                create_branch: true,
                start_point: Some(dev),
                ..Default::default()
            },
        )?;
        self.context.old_branch = old.clone();
        self.record_undo(
            UndoKind::CreateBranch,
            params([("oldBranch", &old), ("newBranch", &release)]),
        )?;
        self.record_undo(
            UndoKind::Checkout,
            params([("oldBranch", &old), ("newBranch", &release)]),
        )?;
        self.context.state.insert(State::START_FINISHED);
        Ok(())
    }

    fn wait_user_to_confirm(&mut self) -> Result<()> {
        if !self.session.interactive {
            return Ok(());
        }
        let prompt = format!("[{}] Finish release now", self.project.name);
        if self.tools.gate.ask_yes_no(&prompt)? {
            Ok(())
        } else {
            Err(ReleaseError::aborted(prompt))
        }
    }

    fn merge(&mut self, source: &str, target: &str) -> Result<()> {
        self.checkout_branch(target)?;
        self.checkpoint()?;
        let prev = self.head()?;
        self.vcs.merge(
            source,
            target,
            &MergeOptions {
                no_fast_forward: true,
                ..Default::default()
            },
        )?;
        let next = self.head()?;
        self.record_undo(
            UndoKind::Merge,
            params([
                ("source", source),
                ("target", target),
                ("prevHead", &prev),
                ("nextHead", &next),
            ]),
        )
    }

    fn release_finish(&mut self) -> Result<()> {
        info!("finish release");
        self.context.state.insert(State::FINISH_STARTED);
        let release = self.context.release_branch.clone();
        let prod = self.context.prod_branch.clone();
        let dev = self.context.dev_branch.clone();
        let tag = self.next_version()?.to_string();

        self.merge(&release, &prod)?;

        self.checkpoint()?;
        self.vcs.tag(
            &tag,
            &TagOptions {
                annotated: true,
                message: Some(format!("Release {}", tag)),
                ..Default::default()
            },
        )?;
        self.record_undo(UndoKind::CreateTag, params([("name", &tag)]))?;

        self.merge(&tag, &dev)?;

        self.checkpoint()?;
        self.vcs
            .delete_branch(&release, &DeleteBranchOptions::default())?;
        self.context.state.insert(State::FINISH_FINISHED);
        Ok(())
    }

    fn prepare_for_next_sprint(&mut self) -> Result<()> {
        info!("prepare for next sprint");
        let dev = self.context.dev_branch.clone();
        let sprint = self
            .context
            .sprint_version
            .clone()
            .ok_or_else(|| ReleaseError::invalid_state("no sprint version"))?;
        self.checkout_branch(&dev)?;

        self.checkpoint()?;
        let old = self.manifest.read_version()?;
        self.manifest.write_version(&sprint)?;
        self.record_undo(
            UndoKind::BumpVersion,
            params([
                ("oldVersion", &old.to_string()),
                ("newVersion", &sprint.to_string()),
            ]),
        )?;

        self.checkpoint()?;
        self.vcs.stage(&StageOptions {
            all: true,
            ..Default::default()
        })?;
        let branch = self.vcs.current_branch()?;
        let prev = self.head()?;
        let subject = format!("Prepare for next sprint: {}", sprint);
        self.vcs.commit(&CommitOptions {
            message: subject.clone(),
            allow_empty: true,
            ..Default::default()
        })?;
        let next = self.head()?;
        self.record_undo(
            UndoKind::Commit,
            params([
                ("branch", &branch),
                ("subject", &subject),
                ("prevHead", &prev),
                ("nextHead", &next),
            ]),
        )
    }
}

impl fmt::Debug for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Release")
            .field("project", &self.project)
            .field("context", &self.context)
            .field("journal", &self.journal)
            .finish()
    }
}

/// Greatest tag that reads as semver (a leading `v` is ignored), else the
/// last one listed
fn latest_tag(tags: &[String]) -> Option<&String> {
    tags.iter()
        .filter_map(|tag| {
            semver::Version::parse(tag.trim_start_matches('v'))
                .ok()
                .map(|v| (v, tag))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, tag)| tag)
        .or_else(|| tags.last())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::ScriptedGate;
    use std::fs;
    use std::path::Path;

    struct Fixture {
        _dir: tempfile::TempDir,
        backend: MockBackend,
        project: Project,
    }

    impl Fixture {
        fn new(version: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("VERSION"), format!("{}\n", version)).unwrap();
            let backend = MockBackend::new();
            backend.init_repo(dir.path(), &["develop", "master"], "develop");
            let project = Project::new("api", dir.path());
            Fixture {
                _dir: dir,
                backend,
                project,
            }
        }

        fn path(&self) -> &Path {
            &self.project.path
        }

        fn release(&self, settings: ReleaseSettings, session: Session) -> Release {
            let tools = Toolkit::mock(self.backend.clone());
            Release::new(self.project.clone(), settings, tools, session).unwrap()
        }

        fn manifest(&self) -> String {
            fs::read_to_string(self.path().join("VERSION")).unwrap()
        }
    }

    #[test]
    fn test_latest_tag() {
        let tags: Vec<String> = ["v1.10.0", "v1.9.0", "1.10.0-rc1", "junk"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(latest_tag(&tags).unwrap(), "v1.10.0");

        let tags = vec!["alpha".to_string(), "beta".to_string()];
        assert_eq!(latest_tag(&tags).unwrap(), "beta");
        assert!(latest_tag(&[]).is_none());
    }

    #[test]
    fn test_prepare_context_is_read_only() {
        let fx = Fixture::new("1.4.0");
        let mut release = fx.release(ReleaseSettings::default(), Session::default());
        release.prepare_context(VersionPart::Minor).unwrap();

        let ctx = &release.context;
        assert_eq!(ctx.version.as_ref().unwrap().to_string(), "1.4.0");
        assert_eq!(ctx.next_version.as_ref().unwrap().to_string(), "1.5.0");
        assert_eq!(ctx.release_branch, "release/1.5.0");
        assert_eq!(ctx.starting_branch, "develop");
        assert!(!ctx.has_remotes);
        assert!(fx.backend.calls(fx.path()).is_empty());
    }

    #[test]
    fn test_prepare_twice_is_invalid() {
        let fx = Fixture::new("1.4.0");
        let mut release = fx.release(ReleaseSettings::default(), Session::default());
        release.prepare_context(VersionPart::Minor).unwrap();
        assert!(matches!(
            release.prepare_context(VersionPart::Minor),
            Err(ReleaseError::InvalidState(_))
        ));
    }

    #[test]
    fn test_run_without_prepare_is_invalid() {
        let fx = Fixture::new("1.4.0");
        let mut release = fx.release(ReleaseSettings::default(), Session::default());
        assert!(matches!(release.run(), Err(ReleaseError::InvalidState(_))));
    }

    #[test]
    fn test_already_tagged() {
        let fx = Fixture::new("1.4.0");
        fx.backend.add_tag(fx.path(), "1.5.0");
        let mut release = fx.release(ReleaseSettings::default(), Session::default());
        assert!(matches!(
            release.prepare_context(VersionPart::Minor),
            Err(ReleaseError::AlreadyTagged(t)) if t == "1.5.0"
        ));
    }

    #[test]
    fn test_version_from_tags() {
        let fx = Fixture::new("0.0.1");
        let settings = ReleaseSettings {
            acquire_version_from: VersionSource::Tags,
            ..Default::default()
        };

        let mut release = fx.release(settings.clone(), Session::default());
        assert!(matches!(
            release.prepare_context(VersionPart::Major),
            Err(ReleaseError::NoTags)
        ));

        fx.backend.add_tag(fx.path(), "2.3.0");
        fx.backend.add_tag(fx.path(), "2.10.1");
        let mut release = fx.release(settings, Session::default());
        release.prepare_context(VersionPart::Build).unwrap();
        assert_eq!(
            release.context.next_version.as_ref().unwrap().to_string(),
            "2.10.2"
        );
    }

    #[test]
    fn test_full_run() {
        let fx = Fixture::new("1.4.0");
        let mut release = fx.release(ReleaseSettings::default(), Session::default());
        release.prepare_context(VersionPart::Minor).unwrap();
        release.run().unwrap();

        assert!(release.context.state.contains(State::FINISHED));
        assert!(release.context.state.contains(State::FINISH_FINISHED));
        assert_eq!(fx.backend.tags(fx.path()), vec!["1.5.0"]);
        assert_eq!(fx.backend.branches(fx.path()), vec!["develop", "master"]);
        assert_eq!(fx.backend.current_branch(fx.path()).unwrap(), "develop");
        assert_eq!(fx.manifest(), "1.5.0\n");

        let names: Vec<&str> = release
            .journal
            .actions()
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "checkout",
                "checkout",
                "create-branch",
                "checkout",
                "checkout",
                "merge",
                "create-tag",
                "checkout",
                "merge",
                "checkout",
                "bump-version",
                "commit",
            ]
        );
    }

    #[test]
    fn test_sprint_version_next() {
        let fx = Fixture::new("1.4.0");
        let settings = ReleaseSettings {
            sprint_version: SprintVersion::Next,
            ..Default::default()
        };
        let mut release = fx.release(settings, Session::default());
        release.prepare_context(VersionPart::Minor).unwrap();
        release.run().unwrap();

        assert_eq!(fx.backend.tags(fx.path()), vec!["1.5.0"]);
        assert_eq!(fx.manifest(), "1.6.0\n");
    }

    #[test]
    fn test_dirty_tree_is_stashed_and_restored() {
        let fx = Fixture::new("1.4.0");
        fx.backend.set_dirty(fx.path(), &["notes.txt"]);
        let mut release = fx.release(ReleaseSettings::default(), Session::default());
        release.prepare_context(VersionPart::Minor).unwrap();
        release.run().unwrap();

        assert_eq!(fx.backend.stash_count(fx.path()), 1);
        let first = &release.journal.actions()[0];
        assert_eq!(first.name, "stash-save");
        assert_eq!(
            first.params["name"],
            "Before release 1.5.0, on branch develop"
        );

        release.rollback().unwrap();
        assert_eq!(fx.backend.stash_count(fx.path()), 0);
        assert_eq!(fx.backend.dirty(fx.path()), vec!["notes.txt"]);
        assert_eq!(fx.manifest(), "1.4.0\n");
        assert!(fx.backend.tags(fx.path()).is_empty());
    }

    #[test]
    fn test_declined_finish_stops_before_merging() {
        let fx = Fixture::new("1.4.0");
        let session = Session::new(false, true);
        let gate = Arc::new(ScriptedGate::new([false], true));
        let tools = Toolkit::mock(fx.backend.clone()).with_gate(gate.clone());
        let mut release =
            Release::new(fx.project.clone(), ReleaseSettings::default(), tools, session).unwrap();
        release.prepare_context(VersionPart::Minor).unwrap();

        let err = release.run().unwrap_err();
        assert!(err.is_abort());
        assert_eq!(gate.asked(), vec!["[api] Finish release now"]);
        assert!(release.context.state.contains(State::START_FINISHED));
        assert!(!release.context.state.contains(State::FINISH_STARTED));
        assert!(!fx
            .backend
            .calls(fx.path())
            .iter()
            .any(|c| c.starts_with("merge")));
    }

    #[test]
    fn test_pulls_only_with_remotes() {
        let fx = Fixture::new("1.4.0");
        fx.backend
            .add_remote(fx.path(), "origin", "git@example.com:api.git");
        let mut release = fx.release(ReleaseSettings::default(), Session::default());
        release.prepare_context(VersionPart::Minor).unwrap();
        release.run().unwrap();

        let calls = fx.backend.calls(fx.path());
        assert_eq!(
            calls[..5].to_vec(),
            vec![
                "checkout master",
                "pull",
                "checkout develop",
                "pull",
                "fetch --tags"
            ]
        );
    }

    #[test]
    fn test_cancelled_before_run() {
        let fx = Fixture::new("1.4.0");
        let session = Session::default();
        session.cancel.cancel();
        let mut release = fx.release(ReleaseSettings::default(), session);
        release.prepare_context(VersionPart::Minor).unwrap();

        assert!(matches!(release.run(), Err(ReleaseError::Interrupted)));
        assert!(release.journal.is_empty());
    }
}
