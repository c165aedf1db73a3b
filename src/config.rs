use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ReleaseError, Result};
use crate::project::Project;
use crate::version::DEFAULT_PRE_RELEASE_PREFIX;

/// Workspace file looked up in the current directory
pub const LOCAL_CONFIG_FILE: &str = ".release-train.toml";
/// Directory and file looked up under the user's config directory
pub const USER_CONFIG_DIR: &str = "release-train";
pub const USER_CONFIG_FILE: &str = "workspace.toml";

/// Where the version being released comes from
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VersionSource {
    /// The project's manifest file
    #[default]
    #[serde(alias = "package")]
    Manifest,
    /// The greatest tag of the repository
    Tags,
}

/// Version written to the development branch once a release is done
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SprintVersion {
    /// The version that was just tagged
    #[default]
    Released,
    /// The released version incremented once more
    Next,
}

fn default_development() -> String {
    "develop".to_string()
}

fn default_production() -> String {
    "master".to_string()
}

fn default_release() -> String {
    "release/$VERSION".to_string()
}

/// Names of the three branch roles.
///
/// `release` may contain `$VERSION`, replaced by the version being released.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct BranchNames {
    #[serde(default = "default_development")]
    pub development: String,

    #[serde(default = "default_production")]
    pub production: String,

    #[serde(default = "default_release")]
    pub release: String,
}

impl Default for BranchNames {
    fn default() -> Self {
        BranchNames {
            development: default_development(),
            production: default_production(),
            release: default_release(),
        }
    }
}

fn default_pre_release_prefix() -> String {
    DEFAULT_PRE_RELEASE_PREFIX.to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct VersioningConfig {
    /// Prefix of a pre-release component incremented from empty
    #[serde(default = "default_pre_release_prefix")]
    pub pre_release_prefix: String,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        VersioningConfig {
            pre_release_prefix: default_pre_release_prefix(),
        }
    }
}

fn default_name() -> String {
    "workspace".to_string()
}

fn default_records_dir() -> PathBuf {
    PathBuf::from(".release-train/releases")
}

/// The projects released together and the policies they share.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Workspace {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub acquire_version_from: VersionSource,

    #[serde(default)]
    pub sprint_version: SprintVersion,

    /// Where release records go, relative to the workspace root
    #[serde(default = "default_records_dir")]
    pub records_dir: PathBuf,

    #[serde(default)]
    pub branch_names: BranchNames,

    #[serde(default)]
    pub versioning: VersioningConfig,

    #[serde(default)]
    pub projects: Vec<Project>,

    /// Directory of the workspace file
    #[serde(skip)]
    pub root: PathBuf,
}

impl Workspace {
    /// Parse a workspace file whose relative paths are based on `root`
    pub fn from_toml_str(content: &str, root: &Path) -> Result<Self> {
        let mut workspace: Workspace = toml::from_str(content)?;
        workspace.root = root.to_path_buf();
        workspace.validate()?;
        for project in &mut workspace.projects {
            if project.path.is_relative() {
                project.path = root.join(&project.path);
            }
        }
        Ok(workspace)
    }

    fn validate(&self) -> Result<()> {
        if self.projects.is_empty() {
            return Err(ReleaseError::config("workspace declares no projects"));
        }
        let mut seen = HashSet::new();
        for project in &self.projects {
            if project.name.trim().is_empty() {
                return Err(ReleaseError::config("project without a name"));
            }
            if !seen.insert(project.name.as_str()) {
                return Err(ReleaseError::config(format!(
                    "project '{}' is declared twice",
                    project.name
                )));
            }
        }
        if self.branch_names.development == self.branch_names.production {
            return Err(ReleaseError::config(
                "development and production branches must differ",
            ));
        }
        Ok(())
    }

    /// Absolute location of the release records
    pub fn records_path(&self) -> PathBuf {
        if self.records_dir.is_absolute() {
            self.records_dir.clone()
        } else {
            self.root.join(&self.records_dir)
        }
    }
}

/// Finds the workspace file.
///
/// Looks in the following order:
/// 1. Custom path provided as parameter
/// 2. `.release-train.toml` in current directory
/// 3. `release-train/workspace.toml` in user config directory
pub fn find_workspace_file(config_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = config_path {
        return Ok(PathBuf::from(path));
    }
    let local = Path::new(".").join(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Ok(local);
    }
    if let Some(config_dir) = dirs::config_dir() {
        let user = config_dir.join(USER_CONFIG_DIR).join(USER_CONFIG_FILE);
        if user.exists() {
            return Ok(user);
        }
    }
    Err(ReleaseError::config(format!(
        "no workspace found, create {} or pass --config",
        LOCAL_CONFIG_FILE
    )))
}

/// Loads the workspace configuration.
///
/// # Arguments
/// * `config_path` - Optional path to custom workspace file
///
/// # Returns
/// * `Ok(Workspace)` - Loaded workspace, project paths made relative to its file
/// * `Err` - If no file is found, or it cannot be read or parsed
pub fn load_workspace(config_path: Option<&str>) -> Result<Workspace> {
    let path = find_workspace_file(config_path)?;
    let content = fs::read_to_string(&path).map_err(|e| {
        ReleaseError::config(format!("cannot read '{}': {}", path.display(), e))
    })?;
    let root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Workspace::from_toml_str(&content, &root)
}
