//! Projects and the manifests that record their version.
//!
//! The release engine reads and writes versions only through
//! [`ProjectAccessor`]; each [`ManifestFormat`] knows one kind of manifest
//! file (`package.json`, `pom.xml`, a plain `VERSION` file).

pub mod maven;
pub mod node;
pub mod plain;

pub use maven::MavenFormat;
pub use node::NodeFormat;
pub use plain::PlainFormat;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ReleaseError, Result};
use crate::vcs::VcsKind;
use crate::version::Version;

/// One repository taking part in a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
    /// Declared kind; the detected backend wins when they differ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Project {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Project {
            name: name.into(),
            path: path.into(),
            vcs: None,
            url: None,
        }
    }
}

/// Reads and writes the version recorded in one project's manifest.
///
/// Every call goes back to the file, so the accessor always sees the
/// content of the branch currently checked out.
pub trait ProjectAccessor: Send + Sync {
    /// Name of the manifest format, e.g. `node`
    fn format(&self) -> &'static str;

    fn path(&self) -> &Path;

    /// Project name as declared by the manifest
    fn current_name(&self) -> Result<String>;

    fn read_version(&self) -> Result<Version>;

    fn write_version(&self, version: &Version) -> Result<()>;
}

impl fmt::Debug for dyn ProjectAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectAccessor")
            .field("format", &self.format())
            .field("path", &self.path())
            .finish()
    }
}

/// Factory for accessors of one manifest kind
pub trait ManifestFormat: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, path: &Path) -> bool;

    fn open(&self, path: &Path, dry_run: bool) -> Result<Box<dyn ProjectAccessor>>;
}

/// Known manifest formats, probed in registration order
#[derive(Clone, Default)]
pub struct Registry {
    formats: Vec<Arc<dyn ManifestFormat>>,
    dry_run: bool,
}

impl Registry {
    pub fn new(dry_run: bool) -> Self {
        Registry {
            formats: Vec::new(),
            dry_run,
        }
    }

    /// node, then maven, then a plain VERSION file
    pub fn with_defaults(dry_run: bool) -> Self {
        let mut registry = Registry::new(dry_run);
        registry.register(Arc::new(NodeFormat));
        registry.register(Arc::new(MavenFormat));
        registry.register(Arc::new(PlainFormat));
        registry
    }

    pub fn register(&mut self, format: Arc<dyn ManifestFormat>) {
        self.formats.push(format);
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.formats.iter().map(|f| f.name()).collect()
    }

    pub fn detect(&self, path: &Path) -> Result<Arc<dyn ManifestFormat>> {
        self.formats
            .iter()
            .find(|f| f.detect(path))
            .cloned()
            .ok_or_else(|| {
                ReleaseError::manifest(format!("no manifest found in '{}'", path.display()))
            })
    }

    pub fn open(&self, path: &Path) -> Result<Box<dyn ProjectAccessor>> {
        self.detect(path)?.open(path, self.dry_run)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("formats", &self.names())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Write `content` to `file` unless running dry
pub(crate) fn write_manifest(file: &Path, content: &str, dry_run: bool) -> Result<()> {
    if dry_run {
        info!(file = %file.display(), "dry run, not writing manifest");
        return Ok(());
    }
    std::fs::write(file, content)?;
    Ok(())
}

pub(crate) fn read_manifest(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).map_err(|e| {
        ReleaseError::manifest(format!("cannot read '{}': {}", file.display(), e))
    })
}

/// Last component of `path`, used when a manifest declares no name
pub(crate) fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
