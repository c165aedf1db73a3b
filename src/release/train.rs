//! Releasing every project of a workspace as one unit.

use std::path::PathBuf;

use tracing::{debug, error, info};

use crate::config::Workspace;
use crate::error::{ReleaseError, Result};
use crate::release::{record, Release, ReleaseSettings, Toolkit};
use crate::session::Session;
use crate::ui;
use crate::version::VersionPart;

const PREFLIGHT_PROMPT: &str = "Do you still want to release them";
const FINAL_PROMPT: &str = "Is everything ok";

/// What a finished run did
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    /// Version the run is filed under
    pub version: String,
    /// Project name and released version, in workspace order
    pub released: Vec<(String, String)>,
    /// Project name and the reason it was left out
    pub skipped: Vec<(String, String)>,
    /// Saved record; `None` on a dry run
    pub record: Option<PathBuf>,
}

pub struct ReleaseTrain<'a> {
    workspace: &'a Workspace,
    tools: Toolkit,
    session: Session,
}

impl<'a> ReleaseTrain<'a> {
    pub fn new(workspace: &'a Workspace, tools: Toolkit, session: Session) -> Self {
        ReleaseTrain {
            workspace,
            tools,
            session,
        }
    }

    /// Release every project of the workspace.
    ///
    /// Projects run one after the other in workspace order. Any failure,
    /// interrupt or declined confirmation rolls back every release
    /// attempted so far, last project first.
    pub fn run(&self, release_type: &str) -> Result<TrainReport> {
        let part: VersionPart = release_type.parse()?;
        let (mut ready, skipped) = self.prepare(part);

        if ready.is_empty() {
            let reasons: Vec<String> = skipped
                .iter()
                .map(|(name, reason)| format!(" - {}: {}", name, reason))
                .collect();
            return Err(ReleaseError::NothingToRelease(reasons.join("\n")));
        }

        if !skipped.is_empty() {
            for (name, reason) in &skipped {
                ui::display_warning(&format!("{} cannot be released: {}", name, reason));
            }
            if !self.tools.gate.ask_yes_no(PREFLIGHT_PROMPT)? {
                return Err(ReleaseError::aborted(PREFLIGHT_PROMPT));
            }
        }

        for index in 0..ready.len() {
            let outcome = self
                .session
                .cancel
                .check()
                .and_then(|_| ready[index].run());
            if let Err(e) = outcome {
                error!(project = %ready[index].name(), error = %e, "release failed");
                return Err(fail(e, rollback_all(&mut ready[..=index])));
            }
        }

        if let Err(e) = self.session.cancel.check() {
            return Err(fail(e, rollback_all(&mut ready)));
        }
        ui::display_status(
            "Check if everything is OK, if it isn't, answering 'no' now will rollback what has been done.",
        );
        match self.tools.gate.ask_yes_no(FINAL_PROMPT) {
            Ok(true) => {
                // an interrupt raised while the prompt was waiting
                if let Err(e) = self.session.cancel.check() {
                    return Err(fail(e, rollback_all(&mut ready)));
                }
            }
            Ok(false) => {
                return Err(fail(
                    ReleaseError::aborted(FINAL_PROMPT),
                    rollback_all(&mut ready),
                ))
            }
            Err(e) => return Err(fail(e, rollback_all(&mut ready))),
        }

        let version = record::run_version(&ready)?;
        let record = if self.session.dry_run {
            info!("dry run, release record not saved");
            None
        } else {
            match record::save(&self.workspace.records_path(), &ready) {
                Ok(path) => Some(path),
                Err(e) => return Err(fail(e, rollback_all(&mut ready))),
            }
        };

        let released = ready
            .iter()
            .map(|r| {
                let version = r
                    .context
                    .next_version
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                (r.name().to_string(), version)
            })
            .collect();
        Ok(TrainReport {
            version,
            released,
            skipped,
            record,
        })
    }

    /// Open and prepare every project, splitting them into ready releases
    /// and (name, reason) pairs for those that cannot go
    fn prepare(&self, part: VersionPart) -> (Vec<Release>, Vec<(String, String)>) {
        let settings = ReleaseSettings::from(self.workspace);
        let mut ready = Vec::new();
        let mut skipped = Vec::new();
        for project in &self.workspace.projects {
            let name = project.name.clone();
            let prepared = Release::new(
                project.clone(),
                settings.clone(),
                self.tools.clone(),
                self.session.clone(),
            )
            .and_then(|mut release| {
                release.prepare_context(part)?;
                Ok(release)
            });
            match prepared {
                Ok(release) => ready.push(release),
                Err(e) => {
                    debug!(project = %name, error = %e, "preparation failed");
                    skipped.push((name, e.to_string()));
                }
            }
        }
        (ready, skipped)
    }
}

/// Roll back `releases` last first, collecting every failure
fn rollback_all(releases: &mut [Release]) -> Vec<String> {
    let mut errors = Vec::new();
    for release in releases.iter_mut().rev() {
        info!(project = %release.name(), "rolling back");
        match release.rollback() {
            Ok(()) => {}
            Err(ReleaseError::Rollback { errors: mut e }) => errors.append(&mut e),
            Err(e) => errors.push(e.to_string()),
        }
    }
    errors
}

/// The error to report once rollback is done: the cause itself, or every
/// rollback failure when the unwind was not clean
fn fail(cause: ReleaseError, rollback_errors: Vec<String>) -> ReleaseError {
    if rollback_errors.is_empty() {
        return cause;
    }
    let mut errors = vec![format!("release failed: {}", cause)];
    errors.extend(rollback_errors);
    ReleaseError::Rollback { errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_keeps_cause_when_clean() {
        let err = fail(ReleaseError::Interrupted, Vec::new());
        assert!(matches!(err, ReleaseError::Interrupted));
    }

    #[test]
    fn test_fail_reports_cause_first() {
        let err = fail(
            ReleaseError::aborted(FINAL_PROMPT),
            vec!["Create tag 1.0.0: not found".to_string()],
        );
        match err {
            ReleaseError::Rollback { errors } => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("Is everything ok"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
