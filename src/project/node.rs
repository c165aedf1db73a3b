use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{ReleaseError, Result};
use crate::project::{read_manifest, write_manifest, ManifestFormat, ProjectAccessor};
use crate::version::Version;

const PACKAGE_FILE: &str = "package.json";

/// npm `package.json`; key order is kept when the file is rewritten
pub struct NodeFormat;

impl ManifestFormat for NodeFormat {
    fn name(&self) -> &'static str {
        "node"
    }

    fn detect(&self, path: &Path) -> bool {
        path.join(PACKAGE_FILE).is_file()
    }

    fn open(&self, path: &Path, dry_run: bool) -> Result<Box<dyn ProjectAccessor>> {
        let accessor = NodeAccessor {
            path: path.to_path_buf(),
            file: path.join(PACKAGE_FILE),
            dry_run,
        };
        accessor.package()?;
        Ok(Box::new(accessor))
    }
}

pub struct NodeAccessor {
    path: PathBuf,
    file: PathBuf,
    dry_run: bool,
}

impl NodeAccessor {
    fn package(&self) -> Result<Value> {
        let content = read_manifest(&self.file)?;
        let package: Value = serde_json::from_str(&content)?;
        if !package.is_object() {
            return Err(ReleaseError::manifest(format!(
                "'{}' is not a JSON object",
                self.file.display()
            )));
        }
        Ok(package)
    }

    fn string_key(&self, package: &Value, key: &str) -> Result<String> {
        package
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ReleaseError::manifest(format!(
                    "no '{}' key found in '{}'",
                    key,
                    self.file.display()
                ))
            })
    }
}

impl ProjectAccessor for NodeAccessor {
    fn format(&self) -> &'static str {
        "node"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn current_name(&self) -> Result<String> {
        self.string_key(&self.package()?, "name")
    }

    fn read_version(&self) -> Result<Version> {
        Version::parse(&self.string_key(&self.package()?, "version")?)
    }

    fn write_version(&self, version: &Version) -> Result<()> {
        let mut package = self.package()?;
        if let Some(map) = package.as_object_mut() {
            map.insert("version".to_string(), Value::String(version.to_string()));
        }
        let mut content = serde_json::to_string_pretty(&package)?;
        content.push('\n');
        write_manifest(&self.file, &content, self.dry_run)
    }
}
