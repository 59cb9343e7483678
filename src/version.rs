// src/version.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{cmp::Ordering, fmt, str::FromStr};

/// `major.minor[.patch][.build][-pre[-pre...]][+label]`
static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d+)\.(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:[~-]([0-9A-Za-z][.0-9A-Za-z]*(?:-[0-9A-Za-z][.0-9A-Za-z]*)*))?(?:\+([.0-9A-Za-z]+))?$",
    )
    .expect("version regex should compile")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version string `{input}`")]
pub struct VersionParseError {
    pub input: String,
}

/// A server release identifier as reported by a node.
///
/// The optional fourth `build` component is only set by vendor builds (DSE reports
/// `4.0.0.<build>`), which is why it takes part in ordering: an absent build sorts
/// before any present one.
#[derive(Debug, Clone)]
pub struct Version {
    major: u32,
    minor: u32,
    patch: u32,
    build: Option<u32>,
    pre_release: Vec<String>,
    label: Option<String>,
}

impl Version {
    pub const V2_1_0: Version = Version::new(2, 1, 0);
    pub const V2_2_0: Version = Version::new(2, 2, 0);
    pub const V3_0_0: Version = Version::new(3, 0, 0);
    pub const V3_8_0: Version = Version::new(3, 8, 0);
    pub const V4_0_0: Version = Version::new(4, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build: None,
            pre_release: Vec::new(),
            label: None,
        }
    }

    pub fn with_build(mut self, build: u32) -> Self {
        self.build = Some(build);
        self
    }

    /// Parse a dotted release string such as `3.11.4`, `4.0.0.2284` or `4.0-beta1`.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let err = || VersionParseError {
            input: input.to_string(),
        };
        let caps = VERSION_RE.captures(input.trim()).ok_or_else(err)?;

        let number = |idx: usize| -> Result<Option<u32>, VersionParseError> {
            caps.get(idx)
                .map(|m| m.as_str().parse::<u32>().map_err(|_| err()))
                .transpose()
        };

        let major = number(1)?.ok_or_else(err)?;
        let minor = number(2)?.ok_or_else(err)?;
        let patch = number(3)?.unwrap_or(0);
        let build = number(4)?;
        let pre_release = caps
            .get(5)
            .map(|m| m.as_str().split('-').map(str::to_string).collect())
            .unwrap_or_default();
        let label = caps.get(6).map(|m| m.as_str().to_string());

        Ok(Self {
            major,
            minor,
            patch,
            build,
            pre_release,
            label,
        })
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> u32 {
        self.patch
    }

    /// The vendor-specific fourth component, if any.
    pub fn build(&self) -> Option<u32> {
        self.build
    }

    pub fn pre_release(&self) -> &[String] {
        &self.pre_release
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The same release without pre-release labels or build label.
    pub fn next_stable(&self) -> Self {
        Self {
            pre_release: Vec::new(),
            label: None,
            ..self.clone()
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            // None < Some(_)
            .then(self.build.cmp(&other.build))
            .then_with(|| {
                match (self.pre_release.is_empty(), other.pre_release.is_empty()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => self.pre_release.cmp(&other.pre_release),
                }
            })
            .then_with(|| self.label.cmp(&other.label))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.build.hash(state);
        self.pre_release.hash(state);
        self.label.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(build) = self.build {
            write!(f, ".{build}")?;
        }
        if !self.pre_release.is_empty() {
            write!(f, "-{}", self.pre_release.join("-"))?;
        }
        if let Some(label) = &self.label {
            write!(f, "+{label}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse(&raw).map_err(serde::de::Error::custom)
    }
}
