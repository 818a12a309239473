// crates/cp-core/src/identifiers.rs
// ============================================================================
// Module: Compliance Pipeline Identifiers
// Description: Canonical opaque identifiers for runs, artifacts, and schemas.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! This module defines the identifiers used throughout the orchestration
//! core. Identifiers are opaque and serialize as strings on the wire.
//! `ArtifactId` enforces the runbook's syntax invariant at construction
//! boundaries; `RunId` wraps a UUID v4.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// SECTION: Artifact Identifier
// ============================================================================

/// Error returned when an artifact id does not match `[A-Za-z0-9._-]+`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid artifact id '{0}': must match [A-Za-z0-9._-]+ and be non-empty")]
pub struct InvalidArtifactId(pub String);

/// Artifact identifier within a runbook.
///
/// # Invariants
/// - Matches `[A-Za-z0-9._-]+`.
/// - Case-sensitive; never normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Creates a new artifact identifier, validating its syntax.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArtifactId`] when `id` is empty or contains a
    /// character outside `[A-Za-z0-9._-]`.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidArtifactId> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if valid { Ok(Self(id)) } else { Err(InvalidArtifactId(id)) }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = InvalidArtifactId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ArtifactId> for String {
    fn from(value: ArtifactId) -> Self {
        value.0
    }
}

impl FromStr for ArtifactId {
    type Err = InvalidArtifactId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// SECTION: Run Identifier
// ============================================================================

/// Run identifier, a UUID v4 scoped to one runbook execution.
///
/// # Invariants
/// - Always a valid UUID; construction never fails once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a fresh random run identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID as a run identifier.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// SECTION: Schema Name
// ============================================================================

/// Name half of a `Schema` identity.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization or validation is applied by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaName(String);

impl SchemaName {
    /// Creates a new schema name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SchemaName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SchemaName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Provider / Component Type Names
// ============================================================================

/// Component type name as referenced from runbook `source.type`/`transform.type`.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization or validation is applied by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentType(String);

impl ComponentType {
    /// Creates a new component type name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the type name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ComponentType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ComponentType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::ArtifactId;
    use super::RunId;

    #[test]
    fn artifact_id_accepts_valid_syntax() {
        assert!(ArtifactId::new("source-A.1_b").is_ok());
    }

    #[test]
    fn artifact_id_rejects_invalid_syntax() {
        assert!(ArtifactId::new("has space").is_err());
        assert!(ArtifactId::new("").is_err());
        assert!(ArtifactId::new("slash/not/allowed").is_err());
    }

    #[test]
    fn artifact_id_is_case_sensitive() {
        let a = ArtifactId::new("Foo").expect("valid");
        let b = ArtifactId::new("foo").expect("valid");
        assert_ne!(a, b);
    }

    #[test]
    fn run_id_round_trips_through_display_and_parse() {
        let id = RunId::generate();
        let text = id.to_string();
        let parsed: RunId = text.parse().expect("valid uuid");
        assert_eq!(id, parsed);
    }
}
