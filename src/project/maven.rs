use std::ops::Range;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{ReleaseError, Result};
use crate::project::{read_manifest, write_manifest, ManifestFormat, ProjectAccessor};
use crate::version::Version;

const POM_FILE: &str = "pom.xml";
const SONAR_FILE: &str = "sonar-project.properties";
const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

/// Maven `pom.xml`.
///
/// Only the project's own `<version>` is touched, never the parent's or a
/// dependency's. A `-SNAPSHOT` suffix is ignored when reading and kept when
/// writing. `sonar-project.properties` is updated alongside when present.
pub struct MavenFormat;

impl ManifestFormat for MavenFormat {
    fn name(&self) -> &'static str {
        "maven"
    }

    fn detect(&self, path: &Path) -> bool {
        path.join(POM_FILE).is_file()
    }

    fn open(&self, path: &Path, dry_run: bool) -> Result<Box<dyn ProjectAccessor>> {
        let accessor = MavenAccessor {
            path: path.to_path_buf(),
            pom: path.join(POM_FILE),
            dry_run,
        };
        accessor.raw_version()?;
        Ok(Box::new(accessor))
    }
}

pub struct MavenAccessor {
    path: PathBuf,
    pom: PathBuf,
    dry_run: bool,
}

impl MavenAccessor {
    /// Version text as written in the pom, with its byte range
    fn raw_version(&self) -> Result<(String, Range<usize>)> {
        let content = read_manifest(&self.pom)?;
        let range = project_child(&content, "version")?.ok_or_else(|| {
            ReleaseError::manifest(format!("no project version in '{}'", self.pom.display()))
        })?;
        Ok((content[range.clone()].trim().to_string(), range))
    }

    fn update_sonar(&self, old: &str, new: &str) -> Result<()> {
        let file = self.path.join(SONAR_FILE);
        if !file.is_file() {
            return Ok(());
        }
        let content = read_manifest(&file)?;
        let mut changed = false;
        let updated: Vec<String> = content
            .lines()
            .map(|line| match line.split_once('=') {
                Some((key, value))
                    if key.trim() == "sonar.projectVersion" && value.trim() == old =>
                {
                    changed = true;
                    format!("{}={}", key, new)
                }
                _ => line.to_string(),
            })
            .collect();
        if changed {
            let mut text = updated.join("\n");
            if content.ends_with('\n') {
                text.push('\n');
            }
            write_manifest(&file, &text, self.dry_run)?;
        }
        Ok(())
    }
}

impl ProjectAccessor for MavenAccessor {
    fn format(&self) -> &'static str {
        "maven"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn current_name(&self) -> Result<String> {
        let content = read_manifest(&self.pom)?;
        let range = project_child(&content, "artifactId")?.ok_or_else(|| {
            ReleaseError::manifest(format!("no artifactId in '{}'", self.pom.display()))
        })?;
        Ok(content[range].trim().to_string())
    }

    fn read_version(&self) -> Result<Version> {
        let (raw, _) = self.raw_version()?;
        Version::parse(raw.strip_suffix(SNAPSHOT_SUFFIX).unwrap_or(&raw))
    }

    fn write_version(&self, version: &Version) -> Result<()> {
        let content = read_manifest(&self.pom)?;
        let (raw, range) = self.raw_version()?;
        let suffix = if raw.ends_with(SNAPSHOT_SUFFIX) {
            SNAPSHOT_SUFFIX
        } else {
            ""
        };
        let new = format!("{}{}", version, suffix);
        let mut updated = String::with_capacity(content.len());
        updated.push_str(&content[..range.start]);
        updated.push_str(&new);
        updated.push_str(&content[range.end..]);
        write_manifest(&self.pom, &updated, self.dry_run)?;
        self.update_sonar(&raw, &new)
    }
}

/// Byte range of the text of `<project>/<name>`, skipping nested elements
/// such as `<parent>` or `<dependencies>`.
fn project_child(content: &str, name: &str) -> Result<Option<Range<usize>>> {
    let tags = Regex::new(r"(?s:<!--.*?-->)|<\?.*?\?>|<(/?)([A-Za-z_][\w.:-]*)[^>]*?(/?)>")
        .map_err(|e| ReleaseError::manifest(e.to_string()))?;
    let mut depth = 0usize;
    let mut open_at: Option<usize> = None;

    for m in tags.captures_iter(content) {
        let whole = match m.get(0) {
            Some(whole) => whole,
            None => continue,
        };
        let tag = match m.get(2) {
            Some(tag) => tag.as_str(),
            None => continue,
        };
        let closing = m.get(1).is_some_and(|c| !c.as_str().is_empty());
        let self_closing = m.get(3).is_some_and(|c| !c.as_str().is_empty());

        if closing {
            if depth == 2 && tag == name {
                if let Some(start) = open_at {
                    return Ok(Some(start..whole.start()));
                }
            }
            depth = depth.saturating_sub(1);
        } else if self_closing {
            continue;
        } else {
            depth += 1;
            if depth == 2 && tag == name {
                open_at = Some(whole.end());
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <!-- <version>0.0.0</version> -->
  <modelVersion>4.0.0</modelVersion>
  <parent>
    <groupId>org.example</groupId>
    <artifactId>parent</artifactId>
    <version>9.9.9</version>
  </parent>
  <artifactId>billing</artifactId>
  <version>1.4.0-SNAPSHOT</version>
  <dependencies>
    <dependency>
      <artifactId>lib</artifactId>
      <version>1.4.0-SNAPSHOT</version>
    </dependency>
  </dependencies>
</project>
"#;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pom.xml"), POM).unwrap();
        dir
    }

    #[test]
    fn test_reads_project_version_not_parent() {
        let dir = project();
        let accessor = MavenFormat.open(dir.path(), false).unwrap();
        assert_eq!(accessor.read_version().unwrap().to_string(), "1.4.0");
        assert_eq!(accessor.current_name().unwrap(), "billing");
    }

    #[test]
    fn test_write_touches_only_project_version() {
        let dir = project();
        let accessor = MavenFormat.open(dir.path(), false).unwrap();
        accessor
            .write_version(&Version::parse("1.5.0").unwrap())
            .unwrap();

        let written = fs::read_to_string(dir.path().join("pom.xml")).unwrap();
        assert!(written.contains("<version>9.9.9</version>"));
        assert!(written.contains("<artifactId>billing</artifactId>\n  <version>1.5.0-SNAPSHOT</version>"));
        assert_eq!(written.matches("1.4.0-SNAPSHOT").count(), 1);
    }

    #[test]
    fn test_sonar_properties_follow() {
        let dir = project();
        fs::write(
            dir.path().join("sonar-project.properties"),
            "sonar.projectKey=billing\nsonar.projectVersion=1.4.0-SNAPSHOT\n",
        )
        .unwrap();

        let accessor = MavenFormat.open(dir.path(), false).unwrap();
        accessor
            .write_version(&Version::parse("1.5.0").unwrap())
            .unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("sonar-project.properties")).unwrap(),
            "sonar.projectKey=billing\nsonar.projectVersion=1.5.0-SNAPSHOT\n"
        );
    }

    #[test]
    fn test_pom_without_version() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("pom.xml"),
            "<project><artifactId>x</artifactId></project>",
        )
        .unwrap();
        assert!(matches!(
            MavenFormat.open(dir.path(), false),
            Err(ReleaseError::Manifest(_))
        ));
    }
}
