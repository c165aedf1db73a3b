use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::project::{dir_name, read_manifest, write_manifest, ManifestFormat, ProjectAccessor};
use crate::version::Version;

const VERSION_FILE: &str = "VERSION";

/// A `VERSION` file holding nothing but the version
pub struct PlainFormat;

impl ManifestFormat for PlainFormat {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn detect(&self, path: &Path) -> bool {
        path.join(VERSION_FILE).is_file()
    }

    fn open(&self, path: &Path, dry_run: bool) -> Result<Box<dyn ProjectAccessor>> {
        let accessor = PlainAccessor {
            path: path.to_path_buf(),
            file: path.join(VERSION_FILE),
            dry_run,
        };
        accessor.read_version()?;
        Ok(Box::new(accessor))
    }
}

pub struct PlainAccessor {
    path: PathBuf,
    file: PathBuf,
    dry_run: bool,
}

impl ProjectAccessor for PlainAccessor {
    fn format(&self) -> &'static str {
        "plain"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn current_name(&self) -> Result<String> {
        Ok(dir_name(&self.path))
    }

    fn read_version(&self) -> Result<Version> {
        Version::parse(read_manifest(&self.file)?.trim())
    }

    fn write_version(&self, version: &Version) -> Result<()> {
        write_manifest(&self.file, &format!("{}\n", version), self.dry_run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_read_and_write() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("VERSION"), "  1.4.0\n").unwrap();

        let accessor = PlainFormat.open(dir.path(), false).unwrap();
        assert_eq!(accessor.read_version().unwrap().to_string(), "1.4.0");

        accessor
            .write_version(&Version::parse("1.5.0").unwrap())
            .unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("VERSION")).unwrap(),
            "1.5.0\n"
        );
    }

    #[test]
    fn test_name_is_directory() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("billing");
        fs::create_dir(&project).unwrap();
        fs::write(project.join("VERSION"), "0.1.0").unwrap();

        let accessor = PlainFormat.open(&project, false).unwrap();
        assert_eq!(accessor.current_name().unwrap(), "billing");
    }
}
