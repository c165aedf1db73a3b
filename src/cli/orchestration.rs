//! Command implementations.
//!
//! Each command takes the loaded workspace, the run's collaborators and
//! session, so it can be driven without clap or a terminal.

use tracing::info;

use crate::config::Workspace;
use crate::error::{ReleaseError, Result};
use crate::release::{record, ReleaseRecord, ReleaseTrain, Toolkit, TrainReport};
use crate::session::Session;
use crate::ui;
use crate::ui::formatter::ProjectStatus;

/// Release every project of the workspace
pub fn run_release(
    workspace: &Workspace,
    tools: Toolkit,
    session: Session,
    release_type: &str,
) -> Result<TrainReport> {
    info!(workspace = %workspace.name, release_type, "starting release");
    ReleaseTrain::new(workspace, tools, session).run(release_type)
}

/// Saved releases of the workspace, oldest first
pub fn list_records(workspace: &Workspace) -> Result<Vec<String>> {
    record::list(&workspace.records_path())
}

/// Revert a saved release.
///
/// Without an explicit version the operator picks one when interactive;
/// otherwise the latest record is used.
pub fn run_undo(
    workspace: &Workspace,
    tools: &Toolkit,
    session: &Session,
    version: Option<&str>,
) -> Result<ReleaseRecord> {
    let dir = workspace.records_path();
    let version = match version {
        Some(version) => version.to_string(),
        None => {
            let records = record::list(&dir)?;
            if records.is_empty() {
                return Err(ReleaseError::invalid_argument(format!(
                    "no saved releases in '{}'",
                    dir.display()
                )));
            }
            if session.interactive {
                ui::select_record(&records)?
            } else {
                records[records.len() - 1].clone()
            }
        }
    };

    let prompt = format!("Undo release {}", version);
    if !tools.gate.ask_yes_no(&prompt)? {
        return Err(ReleaseError::aborted(prompt));
    }
    record::undo(&dir, &version, tools, session.dry_run)
}

/// Inspect every project without changing anything
pub fn project_statuses(workspace: &Workspace, tools: &Toolkit) -> Vec<ProjectStatus> {
    workspace
        .projects
        .iter()
        .map(|project| {
            let mut status = ProjectStatus {
                name: project.name.clone(),
                ..Default::default()
            };
            let mut errors = Vec::new();
            match tools.vcs.open(&project.path) {
                Ok(vcs) => {
                    status.vcs = Some(vcs.kind().to_string());
                    match vcs.current_branch() {
                        Ok(branch) => status.branch = Some(branch),
                        Err(e) => errors.push(e.to_string()),
                    }
                }
                Err(e) => errors.push(e.to_string()),
            }
            match tools
                .manifests
                .open(&project.path)
                .and_then(|m| m.read_version())
            {
                Ok(version) => status.version = Some(version.to_string()),
                Err(e) => errors.push(e.to_string()),
            }
            if !errors.is_empty() {
                status.error = Some(errors.join("; "));
            }
            status
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::MockBackend;
    use std::fs;
    use std::path::Path;

    fn workspace(root: &Path) -> Workspace {
        Workspace::from_toml_str(
            r#"
[[projects]]
name = "api"
path = "api"

[[projects]]
name = "docs"
path = "docs"
"#,
            root,
        )
        .unwrap()
    }

    #[test]
    fn test_project_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        fs::create_dir(dir.path().join("api")).unwrap();
        fs::write(dir.path().join("api/VERSION"), "3.1.0\n").unwrap();

        let backend = MockBackend::new();
        backend.init_repo(&dir.path().join("api"), &["develop"], "develop");
        let tools = Toolkit::mock(backend);

        let statuses = project_statuses(&ws, &tools);
        assert_eq!(
            statuses[0],
            ProjectStatus {
                name: "api".to_string(),
                vcs: Some("git".to_string()),
                branch: Some("develop".to_string()),
                version: Some("3.1.0".to_string()),
                error: None,
            }
        );
        assert_eq!(statuses[1].name, "docs");
        assert!(statuses[1].vcs.is_none());
        assert!(statuses[1].error.is_some());
    }

    #[test]
    fn test_undo_without_records() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let tools = Toolkit::mock(MockBackend::new());
        let session = Session::new(false, false);
        assert!(matches!(
            run_undo(&ws, &tools, &session, None),
            Err(ReleaseError::InvalidArgument(_))
        ));
        assert!(list_records(&ws).unwrap().is_empty());
    }
}
