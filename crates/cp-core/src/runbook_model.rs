// crates/cp-core/src/runbook_model.rs
// ============================================================================
// Module: Runbook Data Model
// Description: Typed representation of a parsed, not-yet-planned runbook.
// Purpose: Give the planner and DAG builder a validated in-memory structure.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Runbook`] is the structural (but not yet schema-resolved) result of
//! parsing a runbook document. [`ArtifactDefinition`] enforces, at
//! deserialization time, that exactly one of `source` / `inputs` is present
//! (invariant 1 of the data model).

use std::fmt;
use std::marker::PhantomData;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use serde::de::MapAccess;
use serde::de::Visitor;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::identifiers::ArtifactId;
use crate::identifiers::ComponentType;

/// A component invocation: its registered type name and its properties bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Registered component type name (`source.type` / `transform.type`).
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    /// Component-specific configuration, merged with run-wide context at
    /// execution time.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// The distinguished `transform.type` value that routes execution through
/// the child-runbook resolver instead of a registered analyser.
pub const CHILD_RUNBOOK_TRANSFORM_TYPE: &str = "runbook";

/// Either a source artifact or a derived artifact, per invariant 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactKind {
    /// Produced by a connector; no upstream artifacts.
    Source {
        /// Connector invocation.
        source: ComponentSpec,
    },
    /// Produced by applying a transform (or passing through) one or more
    /// upstream artifacts.
    Derived {
        /// Upstream artifact ids, in declared fan-in order.
        #[serde(deserialize_with = "deserialize_one_or_many")]
        inputs: Vec<ArtifactId>,
        /// Transform invocation; absent means pass-through.
        #[serde(default)]
        transform: Option<ComponentSpec>,
    },
}

fn deserialize_one_or_many<'de, D>(deserializer: D) -> Result<Vec<ArtifactId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(ArtifactId),
        Many(Vec<ArtifactId>),
    }
    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(id) => Ok(vec![id]),
        OneOrMany::Many(ids) => Ok(ids),
    }
}

/// Definition of a single node in the runbook graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDefinition {
    /// Whether this artifact is a source or a derived node.
    #[serde(flatten)]
    pub kind: ArtifactKind,
    /// Whether this artifact's content is included in the final export.
    #[serde(default)]
    pub output: bool,
    /// Declared output schema reference, `"name"` or `"name/version"`.
    #[serde(default)]
    pub output_schema: Option<String>,
    /// Human-readable display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Contact responsible for this artifact's findings.
    #[serde(default)]
    pub contact: Option<String>,
}

impl ArtifactDefinition {
    /// Returns the upstream artifact ids this definition depends on, in
    /// declared fan-in order; empty for source artifacts.
    #[must_use]
    pub fn inputs(&self) -> &[ArtifactId] {
        match &self.kind {
            ArtifactKind::Source { .. } => &[],
            ArtifactKind::Derived { inputs, .. } => inputs,
        }
    }

    /// Returns `true` when this artifact has no `transform` (pass-through).
    #[must_use]
    pub fn is_pass_through(&self) -> bool {
        matches!(&self.kind, ArtifactKind::Derived { transform: None, .. })
    }
}

/// Error returned when a parsed runbook violates a structural invariant that
/// serde's field shape alone cannot express.
///
/// Duplicate artifact ids are rejected earlier, by
/// [`deserialize_unique_artifacts`] at deserialization time, so they surface
/// as a parse error rather than this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunbookStructureError {
    /// `artifacts` was empty.
    #[error("runbook declares no artifacts")]
    NoArtifacts,
}

/// A parsed, structurally valid runbook.
///
/// Schema resolution, reference validation, and cycle detection are the
/// planner's responsibility, not this type's. `artifacts` preserves the
/// document's declaration order: the executor dispatches artifacts that
/// become ready in the same tick in that order (§5 ordering guarantees).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runbook {
    /// Runbook name.
    pub name: String,
    /// Runbook description.
    pub description: String,
    /// Contact responsible for the runbook as a whole.
    #[serde(default)]
    pub contact: Option<String>,
    /// Artifact graph, keyed by id, in declaration order.
    #[serde(deserialize_with = "deserialize_unique_artifacts")]
    pub artifacts: IndexMap<ArtifactId, ArtifactDefinition>,
}

/// Deserializes the `artifacts` mapping, rejecting a duplicate id explicitly
/// rather than silently keeping the last occurrence (the source format's
/// own merge semantics are not relied upon; see spec open question on
/// duplicate artifact ids).
fn deserialize_unique_artifacts<'de, D>(deserializer: D) -> Result<IndexMap<ArtifactId, ArtifactDefinition>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct UniqueArtifactsVisitor(PhantomData<()>);

    impl<'de> Visitor<'de> for UniqueArtifactsVisitor {
        type Value = IndexMap<ArtifactId, ArtifactDefinition>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a mapping of unique artifact ids to artifact definitions")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut result = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((id, definition)) = map.next_entry::<ArtifactId, ArtifactDefinition>()? {
                if result.insert(id.clone(), definition).is_some() {
                    return Err(serde::de::Error::custom(format!("duplicate artifact id '{id}'")));
                }
            }
            Ok(result)
        }
    }

    deserializer.deserialize_map(UniqueArtifactsVisitor(PhantomData))
}

impl Runbook {
    /// Validates structural invariants not expressible through deserialization
    /// alone (non-empty artifact set; `BTreeMap` already rules out duplicate
    /// keys, but this guards callers that assemble a `Runbook` by hand).
    ///
    /// # Errors
    ///
    /// Returns [`RunbookStructureError::NoArtifacts`] when `artifacts` is
    /// empty.
    pub fn validate_structure(&self) -> Result<(), RunbookStructureError> {
        if self.artifacts.is_empty() {
            return Err(RunbookStructureError::NoArtifacts);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ArtifactKind;
    use super::Runbook;

    #[test]
    fn source_artifact_parses_without_inputs() {
        let yaml = r"
name: test
description: test runbook
artifacts:
  a:
    source:
      type: filesystem
      properties:
        path: /tmp
";
        let runbook: Runbook = serde_yaml::from_str(yaml).expect("valid runbook");
        let artifact = &runbook.artifacts[&"a".parse().expect("valid id")];
        assert!(matches!(artifact.kind, ArtifactKind::Source { .. }));
    }

    #[test]
    fn derived_artifact_accepts_scalar_or_list_inputs() {
        let yaml = r"
name: test
description: test runbook
artifacts:
  a:
    source:
      type: filesystem
      properties: {}
  b:
    inputs: a
  c:
    inputs: [a, b]
";
        let runbook: Runbook = serde_yaml::from_str(yaml).expect("valid runbook");
        assert_eq!(runbook.artifacts[&"b".parse().expect("valid id")].inputs().len(), 1);
        assert_eq!(runbook.artifacts[&"c".parse().expect("valid id")].inputs().len(), 2);
    }

    #[test]
    fn pass_through_derived_has_no_transform() {
        let yaml = r"
name: test
description: test runbook
artifacts:
  a:
    source:
      type: filesystem
      properties: {}
  b:
    inputs: a
";
        let runbook: Runbook = serde_yaml::from_str(yaml).expect("valid runbook");
        assert!(runbook.artifacts[&"b".parse().expect("valid id")].is_pass_through());
    }
}
