// crates/cp-core/src/schema.rs
// ============================================================================
// Module: Schema Identity and Compatibility
// Description: Content-addressed schema identity used for artifact typing.
// Purpose: Let the planner and executor reason about producer/consumer compatibility.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Schema`] identifies the shape of data flowing between components. Two
//! schemas are equal, and hash equal, exactly when their name and version
//! agree; no other field participates in identity or equality.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::identifiers::SchemaName;

/// Semantic version of a [`Schema`], `MAJOR.MINOR.PATCH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SchemaVersion {
    /// Major component; incremented for incompatible changes.
    pub major: u64,
    /// Minor component; incremented for compatible additions.
    pub minor: u64,
    /// Patch component; incremented for compatible fixes.
    pub patch: u64,
}

impl SchemaVersion {
    /// The default version assumed when a runbook omits it (`"1.0.0"`).
    pub const DEFAULT: Self = Self { major: 1, minor: 0, patch: 0 };

    /// Builds a version from its three components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error returned when a schema version string cannot be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid schema version '{0}': expected MAJOR.MINOR.PATCH")]
pub struct InvalidSchemaVersion(pub String);

impl FromStr for SchemaVersion {
    type Err = InvalidSchemaVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(InvalidSchemaVersion(s.to_owned()));
        };
        let parse = |p: &str| p.parse::<u64>().map_err(|_| InvalidSchemaVersion(s.to_owned()));
        Ok(Self { major: parse(major)?, minor: parse(minor)?, patch: parse(patch)? })
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = InvalidSchemaVersion;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SchemaVersion> for String {
    fn from(value: SchemaVersion) -> Self {
        value.to_string()
    }
}

/// Identity of a data shape flowing between components.
///
/// # Invariants
/// - Equality and hashing consider only `name` and `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name, e.g. `"standard_input"`.
    pub name: SchemaName,
    /// Schema version, e.g. `1.0.0`.
    pub version: SchemaVersion,
}

impl Schema {
    /// Builds a schema from a name and version.
    pub fn new(name: impl Into<SchemaName>, version: SchemaVersion) -> Self {
        Self { name: name.into(), version }
    }

    /// Parses a runbook schema reference.
    ///
    /// A bare name (`"standard_input"`) resolves to [`SchemaVersion::DEFAULT`];
    /// an explicit `"name/version"` form resolves to the given version.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSchemaVersion`] when an explicit version segment fails
    /// to parse.
    pub fn parse_reference(reference: &str) -> Result<Self, InvalidSchemaVersion> {
        match reference.split_once('/') {
            Some((name, version)) => Ok(Self::new(name, version.parse()?)),
            None => Ok(Self::new(reference, SchemaVersion::DEFAULT)),
        }
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl Eq for Schema {}

impl std::hash::Hash for Schema {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::Schema;
    use super::SchemaVersion;

    #[test]
    fn bare_name_defaults_to_1_0_0() {
        let schema = Schema::parse_reference("standard_input").expect("valid");
        assert_eq!(schema.version, SchemaVersion::DEFAULT);
    }

    #[test]
    fn explicit_version_is_honored() {
        let schema = Schema::parse_reference("finding/2.3.1").expect("valid");
        assert_eq!(schema.version, SchemaVersion::new(2, 3, 1));
    }

    #[test]
    fn equality_ignores_unrelated_construction_path() {
        let a = Schema::parse_reference("x/1.0.0").expect("valid");
        let b = Schema::new("x", SchemaVersion::new(1, 0, 0));
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_version_is_rejected() {
        assert!(Schema::parse_reference("x/not-a-version").is_err());
    }
}
