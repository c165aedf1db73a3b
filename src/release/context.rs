use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ReleaseError, Result};
use crate::version::Version;

/// Phases a release went through, as a set of independent bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct State(u8);

impl State {
    pub const CREATED: State = State(0);
    pub const STARTED: State = State(1);
    pub const FINISHED: State = State(1 << 1);
    pub const START_STARTED: State = State(1 << 2);
    pub const START_FINISHED: State = State(1 << 3);
    pub const FINISH_STARTED: State = State(1 << 4);
    pub const FINISH_FINISHED: State = State(1 << 5);

    const NAMES: [(State, &'static str); 6] = [
        (State::STARTED, "started"),
        (State::FINISHED, "finished"),
        (State::START_STARTED, "start_started"),
        (State::START_FINISHED, "start_finished"),
        (State::FINISH_STARTED, "finish_started"),
        (State::FINISH_FINISHED, "finish_finished"),
    ];

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: State) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: State) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: State) {
        self.0 &= !other.0;
    }

    pub fn is_created(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for State {
    type Output = State;

    fn bitor(self, rhs: State) -> State {
        State(self.0 | rhs.0)
    }
}

impl BitOrAssign for State {
    fn bitor_assign(&mut self, rhs: State) {
        self.insert(rhs);
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_created() {
            return write!(f, "created");
        }
        let names: Vec<&str> = State::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join(" | "))
    }
}

impl FromStr for State {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        let mut state = State::CREATED;
        for name in s.split('|').map(str::trim) {
            if name == "created" || name.is_empty() {
                continue;
            }
            let (bit, _) = State::NAMES
                .iter()
                .find(|(_, n)| *n == name)
                .ok_or_else(|| ReleaseError::parse(format!("unknown release state '{}'", name)))?;
            state.insert(*bit);
        }
        Ok(state)
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Everything one project's release knows about itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub starting_branch: String,
    /// Branch checked out before the most recent checkout
    pub old_branch: String,
    pub release_branch: String,
    pub dev_branch: String,
    pub prod_branch: String,
    pub date: DateTime<Utc>,
    /// Version acquired before the release
    pub version: Option<Version>,
    /// Version being released and tagged
    pub next_version: Option<Version>,
    /// Version written to the development branch afterwards
    pub sprint_version: Option<Version>,
    pub has_remotes: bool,
    pub state: State,
}

impl Context {
    pub fn new(dev_branch: impl Into<String>, prod_branch: impl Into<String>) -> Self {
        Context {
            starting_branch: String::new(),
            old_branch: String::new(),
            release_branch: String::new(),
            dev_branch: dev_branch.into(),
            prod_branch: prod_branch.into(),
            date: Utc::now(),
            version: None,
            next_version: None,
            sprint_version: None,
            has_remotes: false,
            state: State::CREATED,
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.next_version.is_some()
    }
}

/// Substitute the released version into a branch name template
pub fn render_branch(template: &str, version: &Version) -> String {
    template.replace("$VERSION", &version.to_string())
}
