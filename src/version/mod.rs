//! Decomposed version numbers.
//!
//! A [`Version`] holds six textual components (major, minor, build,
//! revision, pre-release and build metadata). Any component may be empty;
//! empty components are skipped together with their separator when the
//! version is formatted.
//!
//! ```rust
//! # use release_train::version::{Version, VersionPart};
//! let mut v: Version = "1.2.3".parse().unwrap();
//! v.increment(VersionPart::Minor, 1).unwrap();
//! assert_eq!(v.to_string(), "1.3.0");
//! ```

pub mod part;

pub use part::VersionPart;

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ReleaseError, Result};

/// Prefix given to a pre-release component incremented from empty
pub const DEFAULT_PRE_RELEASE_PREFIX: &str = "rc";

const VERSION_PATTERN: &str = r"^(?P<major>[^.\-+]*)(?:\.(?P<minor>[^.\-+]+))?(?:\.(?P<build>[^.\-+]+))?(?:\.(?P<revision>[^.\-+]+))?(?:-(?P<preRelease>[^+]+))?(?:\+(?P<buildMetaTag>.+))?$";

const NUMERIC_SUFFIX_PATTERN: &str = r"^(\D*)(\d+)$";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Version {
    parts: [String; VersionPart::COUNT],
}

impl Version {
    /// Build a version from leading components; missing trailing ones stay empty.
    pub fn new<I, S>(components: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut version = Version::default();
        for (index, component) in components.into_iter().enumerate() {
            version.set_at(index, component)?;
        }
        Ok(version)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let re = Regex::new(VERSION_PATTERN)
            .map_err(|e| ReleaseError::parse(format!("Invalid version pattern: {}", e)))?;
        let captures = re
            .captures(text.trim())
            .ok_or_else(|| ReleaseError::parse(format!("'{}' is not a version", text)))?;

        let mut version = Version::default();
        for part in VersionPart::ALL {
            if let Some(m) = captures.name(part.name()) {
                version.parts[part.index()] = m.as_str().to_string();
            }
        }
        Ok(version)
    }

    pub fn get(&self, part: VersionPart) -> &str {
        &self.parts[part.index()]
    }

    pub fn get_at(&self, index: usize) -> Result<&str> {
        Ok(self.get(VersionPart::from_index(index)?))
    }

    /// Numeric value of a component; fails on empty or non-numeric text
    pub fn get_int(&self, part: VersionPart) -> Result<i32> {
        let value = self.get(part);
        value.parse::<i32>().map_err(|e| {
            ReleaseError::parse(format!("{} component '{}' is not a number: {}", part, value, e))
        })
    }

    pub fn set(&mut self, part: VersionPart, value: impl Into<String>) {
        self.parts[part.index()] = value.into();
    }

    pub fn set_at(&mut self, index: usize, value: impl Into<String>) -> Result<()> {
        self.set(VersionPart::from_index(index)?, value);
        Ok(())
    }

    pub fn set_int(&mut self, part: VersionPart, value: i32) {
        self.set(part, value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| p.is_empty())
    }

    /// Non-empty components in index order
    pub fn non_empty_parts(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.as_str())
            .collect()
    }

    /// Add `step` to a component and zero every non-empty component after it.
    pub fn increment(&mut self, part: VersionPart, step: i32) -> Result<()> {
        self.increment_with_prefix(part, step, DEFAULT_PRE_RELEASE_PREFIX)
    }

    /// Like [`Version::increment`], naming the prefix an empty pre-release starts from.
    pub fn increment_with_prefix(
        &mut self,
        part: VersionPart,
        step: i32,
        pre_release_prefix: &str,
    ) -> Result<()> {
        if step <= 0 {
            return Err(ReleaseError::invalid_argument(format!(
                "invalid increment step {}",
                step
            )));
        }
        let (prefix, value) = self.split_numeric(part, pre_release_prefix)?;
        let next = value.checked_add(step).ok_or_else(|| {
            ReleaseError::invalid_argument(format!("{} component overflows", part))
        })?;
        self.parts[part.index()] = format!("{}{}", prefix, next);
        self.reset_after(part)
    }

    pub fn increment_at(&mut self, index: usize, step: i32) -> Result<()> {
        self.increment(VersionPart::from_index(index)?, step)
    }

    /// Subtract `step` from a component and zero every non-empty component after it.
    ///
    /// A component is never taken below zero.
    pub fn decrement(&mut self, part: VersionPart, step: i32) -> Result<()> {
        if step <= 0 {
            return Err(ReleaseError::invalid_argument(format!(
                "invalid decrement step {}",
                step
            )));
        }
        let (prefix, value) = self.split_numeric(part, "")?;
        if value < step {
            return Err(ReleaseError::invalid_argument(format!(
                "cannot decrement {} component {} by {}",
                part, value, step
            )));
        }
        self.parts[part.index()] = format!("{}{}", prefix, value - step);
        self.reset_after(part)
    }

    pub fn decrement_at(&mut self, index: usize, step: i32) -> Result<()> {
        self.decrement(VersionPart::from_index(index)?, step)
    }

    /// A copy of this version with one component incremented
    pub fn bumped(&self, part: VersionPart, step: i32, pre_release_prefix: &str) -> Result<Self> {
        let mut next = self.clone();
        next.increment_with_prefix(part, step, pre_release_prefix)?;
        Ok(next)
    }

    fn split_numeric(&self, part: VersionPart, empty_prefix: &str) -> Result<(String, i32)> {
        let text = self.get(part);
        if text.is_empty() {
            let prefix = if part == VersionPart::PreRelease {
                empty_prefix
            } else {
                ""
            };
            return Ok((prefix.to_string(), 0));
        }
        split_numeric_suffix(text).ok_or_else(|| {
            ReleaseError::parse(format!(
                "{} component '{}' has no numeric suffix",
                part, text
            ))
        })?
    }

    fn reset_after(&mut self, part: VersionPart) -> Result<()> {
        for index in part.index() + 1..VersionPart::COUNT {
            let text = &self.parts[index];
            if text.is_empty() {
                continue;
            }
            let zeroed = match split_numeric_suffix(text) {
                Some(Ok((prefix, _))) => format!("{}0", prefix),
                Some(Err(e)) => return Err(e),
                None => "0".to_string(),
            };
            self.parts[index] = zeroed;
        }
        Ok(())
    }
}

/// Split `text` into a non-digit prefix and its trailing number.
///
/// Returns `None` when there are no trailing digits and a parse error when
/// the digits do not fit in 32 bits.
fn split_numeric_suffix(text: &str) -> Option<Result<(String, i32)>> {
    let re = match Regex::new(NUMERIC_SUFFIX_PATTERN) {
        Ok(re) => re,
        Err(e) => return Some(Err(ReleaseError::parse(e.to_string()))),
    };
    let captures = re.captures(text)?;
    let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let digits = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
    Some(
        digits
            .parse::<i32>()
            .map(|n| (prefix.to_string(), n))
            .map_err(|e| ReleaseError::parse(format!("'{}' is out of range: {}", text, e))),
    )
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in VersionPart::ALL {
            let text = self.get(part);
            if !text.is_empty() {
                write!(f, "{}{}", part.separator(), text)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Version::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let v = Version::parse("1.0.0").unwrap();
        assert_eq!(v.non_empty_parts(), vec!["1", "0", "0"]);
        assert_eq!(v.get(VersionPart::Revision), "");
    }

    #[test]
    fn test_parse_pre_release() {
        let v = Version::parse("1.0.0-rc0").unwrap();
        assert_eq!(v.non_empty_parts(), vec!["1", "0", "0", "rc0"]);
        assert_eq!(v.get(VersionPart::PreRelease), "rc0");
    }

    #[test]
    fn test_parse_build_meta_tag() {
        let v = Version::parse("1.0.0+sadfeed44").unwrap();
        assert_eq!(v.non_empty_parts(), vec!["1", "0", "0", "sadfeed44"]);
        assert_eq!(v.get(VersionPart::BuildMetaTag), "sadfeed44");
        assert_eq!(v.get(VersionPart::PreRelease), "");
    }

    #[test]
    fn test_parse_all_components() {
        let v = Version::parse("1.2.3.4-beta.2+exp.sha.5114f85").unwrap();
        assert_eq!(v.get(VersionPart::Major), "1");
        assert_eq!(v.get(VersionPart::Minor), "2");
        assert_eq!(v.get(VersionPart::Build), "3");
        assert_eq!(v.get(VersionPart::Revision), "4");
        assert_eq!(v.get(VersionPart::PreRelease), "beta.2");
        assert_eq!(v.get(VersionPart::BuildMetaTag), "exp.sha.5114f85");
    }

    #[test]
    fn test_parse_rejects_extra_components() {
        assert!(matches!(
            Version::parse("1.2.3.4.5"),
            Err(ReleaseError::Parse(_))
        ));
    }

    #[test]
    fn test_format_round_trip() {
        for text in [
            "1",
            "1.2",
            "1.2.3",
            "1.2.3.4",
            "1.2.3-rc1",
            "1.2.3.4-alpha-2+build.7",
            "0.0.1+abc",
        ] {
            let v = Version::parse(text).unwrap();
            assert_eq!(v.to_string(), text);
            assert_eq!(Version::parse(&v.to_string()).unwrap(), v);
        }
    }

    #[test]
    fn test_new_and_index_access() {
        let v = Version::new(["0", "0", "0", "1", "rc1"]).unwrap();
        assert_eq!(v.to_string(), "0.0.0.1-rc1");
        assert_eq!(v.get_at(4).unwrap(), "rc1");
        assert!(matches!(v.get_at(6), Err(ReleaseError::Range { .. })));
        assert!(Version::new(["1", "2", "3", "4", "5", "6", "7"]).is_err());
    }

    #[test]
    fn test_get_and_set_int() {
        let mut v = Version::parse("3.9.1").unwrap();
        assert_eq!(v.get_int(VersionPart::Minor).unwrap(), 9);
        v.set_int(VersionPart::Build, 12);
        assert_eq!(v.to_string(), "3.9.12");
        assert!(v.get_int(VersionPart::PreRelease).is_err());
    }

    #[test]
    fn test_increment_minor() {
        let mut v = Version::parse("1.2.3").unwrap();
        v.increment(VersionPart::Minor, 1).unwrap();
        assert_eq!(v.to_string(), "1.3.0");
    }

    #[test]
    fn test_increment_pre_release() {
        let mut v = Version::parse("1.0.0-rc0").unwrap();
        v.increment(VersionPart::PreRelease, 1).unwrap();
        assert_eq!(v.to_string(), "1.0.0-rc1");

        let mut v = Version::new(["0", "0", "0", "1", "rc1"]).unwrap();
        v.increment(VersionPart::PreRelease, 1).unwrap();
        assert_eq!(v.to_string(), "0.0.0.1-rc2");
    }

    #[test]
    fn test_increment_empty_pre_release_uses_prefix() {
        let mut v = Version::parse("2.0.0").unwrap();
        v.increment(VersionPart::PreRelease, 1).unwrap();
        assert_eq!(v.to_string(), "2.0.0-rc1");

        let mut v = Version::parse("2.0.0").unwrap();
        v.increment_with_prefix(VersionPart::PreRelease, 1, "beta")
            .unwrap();
        assert_eq!(v.to_string(), "2.0.0-beta1");
    }

    #[test]
    fn test_increment_cascades() {
        let cases = [
            ("0.0.0.1", VersionPart::Revision, "0.0.0.2"),
            ("0.0.1.1", VersionPart::Build, "0.0.2.0"),
            ("0.1.1.1", VersionPart::Minor, "0.2.0.0"),
            ("1.1.1.1", VersionPart::Major, "2.0.0.0"),
            ("1.4.2-rc3", VersionPart::Minor, "1.5.0-rc0"),
        ];
        for (input, part, expected) in cases {
            let mut v = Version::parse(input).unwrap();
            v.increment(part, 1).unwrap();
            assert_eq!(v.to_string(), expected, "{} + {}", input, part);
        }
    }

    #[test]
    fn test_increment_leaves_lower_components() {
        let mut v = Version::parse("7.8.9.10").unwrap();
        v.increment(VersionPart::Build, 3).unwrap();
        assert_eq!(v.get(VersionPart::Major), "7");
        assert_eq!(v.get(VersionPart::Minor), "8");
        assert_eq!(v.get(VersionPart::Build), "12");
        assert_eq!(v.get(VersionPart::Revision), "0");
    }

    #[test]
    fn test_increment_keeps_prefix() {
        let mut v = Version::parse("v1.2").unwrap();
        v.increment(VersionPart::Major, 1).unwrap();
        assert_eq!(v.to_string(), "v2.0");
    }

    #[test]
    fn test_increment_without_digits_fails() {
        let mut v = Version::parse("0.0.0.1+234234sdf").unwrap();
        assert!(matches!(
            v.increment(VersionPart::BuildMetaTag, 1),
            Err(ReleaseError::Parse(_))
        ));
    }

    #[test]
    fn test_increment_rejects_bad_step_and_index() {
        let mut v = Version::parse("1.0.0").unwrap();
        assert!(matches!(
            v.increment(VersionPart::Major, 0),
            Err(ReleaseError::InvalidArgument(_))
        ));
        assert!(matches!(
            v.increment(VersionPart::Major, -2),
            Err(ReleaseError::InvalidArgument(_))
        ));
        assert!(matches!(
            v.increment_at(9, 1),
            Err(ReleaseError::Range { index: 9, .. })
        ));
        assert_eq!(v.to_string(), "1.0.0");
    }

    #[test]
    fn test_increment_out_of_range_number() {
        let mut v = Version::parse("99999999999.0").unwrap();
        assert!(matches!(
            v.increment(VersionPart::Major, 1),
            Err(ReleaseError::Parse(_))
        ));
    }

    #[test]
    fn test_decrement_restores_target_component() {
        let mut v = Version::parse("1.4.2").unwrap();
        v.increment(VersionPart::Minor, 2).unwrap();
        assert_eq!(v.to_string(), "1.6.0");
        v.decrement(VersionPart::Minor, 2).unwrap();
        assert_eq!(v.to_string(), "1.4.0");
    }

    #[test]
    fn test_decrement_below_zero_fails() {
        let mut v = Version::parse("1.0.0").unwrap();
        assert!(matches!(
            v.decrement(VersionPart::Minor, 1),
            Err(ReleaseError::InvalidArgument(_))
        ));
        assert!(matches!(
            v.decrement(VersionPart::Revision, 1),
            Err(ReleaseError::InvalidArgument(_))
        ));
        assert_eq!(v.to_string(), "1.0.0");
        assert!(matches!(
            v.decrement_at(6, 1),
            Err(ReleaseError::Range { .. })
        ));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = Version::parse("1.4.0").unwrap();
        let mut copy = original.clone();
        copy.increment(VersionPart::Major, 1).unwrap();
        assert_eq!(original.to_string(), "1.4.0");
        assert_eq!(copy.to_string(), "2.0.0");

        let bumped = original.bumped(VersionPart::Minor, 1, "rc").unwrap();
        assert_eq!(bumped.to_string(), "1.5.0");
        assert_eq!(original.to_string(), "1.4.0");
    }

    #[test]
    fn test_serde_as_string() {
        let v = Version::parse("1.5.0-rc2").unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"1.5.0-rc2\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
