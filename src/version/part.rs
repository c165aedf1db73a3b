use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ReleaseError, Result};

/// One of the six components of a [`Version`](super::Version).
///
/// The declaration order is the component index, which is also the order in
/// which components are formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VersionPart {
    Major,
    Minor,
    Build,
    Revision,
    PreRelease,
    BuildMetaTag,
}

impl VersionPart {
    /// Every component, in index order
    pub const ALL: [VersionPart; 6] = [
        VersionPart::Major,
        VersionPart::Minor,
        VersionPart::Build,
        VersionPart::Revision,
        VersionPart::PreRelease,
        VersionPart::BuildMetaTag,
    ];

    /// Number of components in a version
    pub const COUNT: usize = 6;

    pub fn index(self) -> usize {
        self as usize
    }

    /// Look a component up by index, failing with a range error past the last one
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL.get(index).copied().ok_or(ReleaseError::Range {
            index,
            len: Self::COUNT,
        })
    }

    /// Name used on the command line and in configuration files
    pub fn name(self) -> &'static str {
        match self {
            VersionPart::Major => "major",
            VersionPart::Minor => "minor",
            VersionPart::Build => "build",
            VersionPart::Revision => "revision",
            VersionPart::PreRelease => "preRelease",
            VersionPart::BuildMetaTag => "buildMetaTag",
        }
    }

    /// Text written before this component when it is not empty
    pub fn separator(self) -> &'static str {
        match self {
            VersionPart::Major => "",
            VersionPart::Minor | VersionPart::Build | VersionPart::Revision => ".",
            VersionPart::PreRelease => "-",
            VersionPart::BuildMetaTag => "+",
        }
    }
}

impl FromStr for VersionPart {
    type Err = ReleaseError;

    /// Release types are matched case-sensitively
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|part| part.name() == s)
            .ok_or_else(|| ReleaseError::UnknownReleaseType(s.to_string()))
    }
}

impl fmt::Display for VersionPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
