//! Release records saved after a successful run, replayable by `undo`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ReleaseError, Result};
use crate::project::Project;
use crate::release::{Context, Journal, Release, Toolkit};

const RECORD_EXTENSION: &str = "json";

/// One project's part of a saved run
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEntry {
    pub project: Project,
    pub context: Context,
    pub undo_actions: Journal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub version: String,
    pub date: DateTime<Utc>,
    pub releases: Vec<RecordEntry>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryRef<'a> {
    project: &'a Project,
    context: &'a Context,
    undo_actions: &'a Journal,
}

#[derive(Serialize)]
struct RecordRef<'a> {
    version: String,
    date: DateTime<Utc>,
    releases: Vec<EntryRef<'a>>,
}

/// `<dir>/<version>.json`
pub fn record_path(dir: &Path, version: &str) -> PathBuf {
    dir.join(format!("{}.{}", version, RECORD_EXTENSION))
}

/// Version a run is filed under: the first release's version
pub fn run_version(releases: &[Release]) -> Result<String> {
    releases
        .first()
        .and_then(|r| r.context.next_version.as_ref())
        .map(|v| v.to_string())
        .ok_or_else(|| ReleaseError::invalid_state("no prepared release to record"))
}

/// Write the record of a finished run and return its path
pub fn save(dir: &Path, releases: &[Release]) -> Result<PathBuf> {
    let version = run_version(releases)?;
    let record = RecordRef {
        version: version.clone(),
        date: Utc::now(),
        releases: releases
            .iter()
            .map(|r| EntryRef {
                project: &r.project,
                context: &r.context,
                undo_actions: &r.journal,
            })
            .collect(),
    };
    fs::create_dir_all(dir)?;
    let path = record_path(dir, &version);
    if path.exists() {
        warn!(path = %path.display(), "overwriting existing release record");
    }
    let mut content = serde_json::to_string_pretty(&record)?;
    content.push('\n');
    fs::write(&path, content)?;
    info!(path = %path.display(), "release record saved");
    Ok(path)
}

fn write(path: &Path, record: &ReleaseRecord) -> Result<()> {
    let mut content = serde_json::to_string_pretty(record)?;
    content.push('\n');
    fs::write(path, content)?;
    Ok(())
}

/// Versions of every saved record, oldest file name first
pub fn list(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut versions = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            versions.push(stem.to_string());
        }
    }
    versions.sort_by(|a, b| compare_versions(a, b));
    Ok(versions)
}

fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |s: &str| semver::Version::parse(s.trim_start_matches('v')).ok();
    match (parse(a), parse(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Load a record by version; a trailing `.json` is accepted
pub fn load(dir: &Path, version: &str) -> Result<ReleaseRecord> {
    let version = version
        .strip_suffix(&format!(".{}", RECORD_EXTENSION))
        .unwrap_or(version);
    let path = record_path(dir, version);
    let content = fs::read_to_string(&path).map_err(|e| {
        ReleaseError::invalid_argument(format!(
            "no release record '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Replay a saved run backwards, last project first.
///
/// The record is removed once every action was undone; otherwise it is
/// rewritten with the executed flags so a second attempt only retries
/// what is left. Nothing is written or removed when `dry_run` is set.
pub fn undo(dir: &Path, version: &str, tools: &Toolkit, dry_run: bool) -> Result<ReleaseRecord> {
    let mut record = load(dir, version)?;
    let path = record_path(dir, &record.version);
    let mut errors = Vec::new();

    for entry in record.releases.iter_mut().rev() {
        info!(project = %entry.project.name, "undoing release");
        match entry.undo_actions.rollback(tools) {
            Ok(()) => {}
            Err(ReleaseError::Rollback { errors: mut e }) => errors.append(&mut e),
            Err(e) => errors.push(e.to_string()),
        }
    }

    if dry_run {
        info!(path = %path.display(), "dry run, keeping release record");
    } else if errors.is_empty() {
        fs::remove_file(&path)?;
        info!(path = %path.display(), "release record removed");
    } else {
        write(&path, &record)?;
    }

    if errors.is_empty() {
        Ok(record)
    } else {
        Err(ReleaseError::Rollback { errors })
    }
}
