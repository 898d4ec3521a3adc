use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Version is a semantic version of a bundle.
///
/// Its total order is semver 2.0 precedence, extended with build metadata
/// as a tiebreaker: a version carrying build metadata orders after an
/// otherwise-equal version without it, and two build strings compare
/// lexicographically. Upgrade-graph resolution relies on this order being
/// total, which strict semver 2.0 precedence is not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(semver::Version);

impl Version {
    pub fn new(inner: semver::Version) -> Self {
        Self(inner)
    }
    pub fn inner(&self) -> &semver::Version {
        &self.0
    }
    pub fn major(&self) -> u64 {
        self.0.major
    }
    pub fn minor(&self) -> u64 {
        self.0.minor
    }
    pub fn pre(&self) -> &semver::Prerelease {
        &self.0.pre
    }
}

impl FromStr for Version {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(semver::Version::parse(s)?))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .cmp_precedence(&other.0)
            .then_with(|| match (self.0.build.is_empty(), other.0.build.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => self.0.build.as_str().cmp(other.0.build.as_str()),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Range is a semver range expression, as used by the skipRange field and
/// by required-package properties.
///
/// The grammar is `||`-separated alternatives, where each alternative is a
/// conjunction of comparators separated by whitespace or commas, e.g.
/// `">=0.9.0 <0.9.2 || >=1.0.0"`. A version is in the range if any
/// alternative accepts it.
#[derive(Debug, Clone)]
pub struct Range {
    raw: String,
    alternatives: Vec<semver::VersionReq>,
}

impl Range {
    /// Returns whether |version| lies within this range.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(&version.0))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ParseRangeError {
    #[error("range expression has an empty alternative")]
    Empty,
    #[error(transparent)]
    Semver(#[from] semver::Error),
}

impl FromStr for Range {
    type Err = ParseRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let alternatives = s
            .split("||")
            .map(|alt| {
                let comparators: Vec<&str> = alt
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|t| !t.is_empty())
                    .collect();
                if comparators.is_empty() {
                    return Err(ParseRangeError::Empty);
                }
                Ok(semver::VersionReq::parse(&comparators.join(", "))?)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: s.to_string(),
            alternatives,
        })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// Ranges are equal when their expressions are equal.
// Semantically-equal expressions which are spelled differently are
// deliberately distinct, preserving the author's spelling on round-trip.
impl PartialEq for Range {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl Eq for Range {}

impl schemars::JsonSchema for Range {
    fn schema_name() -> String {
        "Range".to_string()
    }
    fn json_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        serde_json::from_value(serde_json::json!({"type": "string"})).unwrap()
    }
}

impl Serialize for Range {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Range {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
