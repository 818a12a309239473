// crates/cp-runbook/src/lib.rs
// ============================================================================
// Crate: cp-runbook
// Description: Parses runbook YAML, substitutes ${ENV_VAR} references,
//              validates structural invariants.
// Purpose: Turn a runbook document (file or dict) into a cp_core::Runbook.
// Dependencies: cp-core, regex, serde_json, serde_yaml, thiserror
// ============================================================================

//! # cp-runbook
//!
//! [`parse`] reads a runbook file, substitutes every `${IDENT}` occurrence in
//! every string leaf of the raw YAML value, then deserializes the result into
//! a [`cp_core::Runbook`] and checks its structural invariants (spec.md
//! §4.5). [`parse_from_dict`] skips substitution, for tests and programmatic
//! runbook construction (spec.md §4.5, §8 "env-var substitution round-trip").
//!
//! Grounded on `examples/original_source/libs/waivern-orchestration`'s
//! `parser` module: substitution happens on the raw document *before*
//! structural validation, exactly as the original does, so a malformed
//! substituted value (e.g. a non-string type coerced from an env var) is
//! still caught by the same deserialization path as a hand-written mistake.

use std::fmt;
use std::path::Path;

use cp_core::Runbook;
use cp_core::runbook_model::RunbookStructureError;
use regex::Regex;
use thiserror::Error;

/// Error returned when a runbook cannot be parsed into a valid [`Runbook`].
#[derive(Debug, Error)]
pub enum RunbookParseError {
    /// The runbook file could not be read.
    #[error("could not read runbook file '{path}': {source}")]
    Io {
        /// Path that could not be read.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file's contents were not valid YAML.
    #[error("runbook '{path}' is not valid YAML: {source}")]
    Yaml {
        /// Path whose contents failed to parse.
        path: String,
        /// Underlying parse failure.
        #[source]
        source: serde_yaml::Error,
    },
    /// A `${IDENT}` reference named an environment variable that is unset.
    #[error("runbook references undefined environment variable '{0}'")]
    MissingEnvVar(String),
    /// The parsed document did not match the `Runbook` shape.
    #[error("runbook does not match the expected structure: {0}")]
    Structure(#[source] StructureMismatch),
    /// The parsed, well-shaped document violated a structural invariant.
    #[error(transparent)]
    Invariant(#[from] RunbookStructureError),
}

/// Opaque wrapper distinguishing a deserialization failure against the
/// `Runbook` shape from a raw-YAML syntax failure, so callers can tell "not
/// YAML at all" from "YAML, but not a runbook" apart (both map to distinct
/// [`RunbookParseError`] variants).
#[derive(Debug)]
pub struct StructureMismatch(String);

impl fmt::Display for StructureMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for StructureMismatch {}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

/// Substitutes every `${IDENT}` occurrence in `text` with the value of the
/// named environment variable.
///
/// # Errors
///
/// Returns [`RunbookParseError::MissingEnvVar`] naming the first undefined
/// variable encountered.
fn substitute_env_vars(text: &str) -> Result<String, RunbookParseError> {
    let pattern = env_var_pattern();
    let mut missing: Option<String> = None;
    let substituted = pattern.replace_all(text, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => {
                if missing.is_none() {
                    missing = Some(name.to_owned());
                }
                String::new()
            }
        }
    });
    if let Some(name) = missing {
        return Err(RunbookParseError::MissingEnvVar(name));
    }
    Ok(substituted.into_owned())
}

/// Recursively substitutes `${IDENT}` references in every string leaf of a
/// raw YAML value, leaving structure and non-string scalars untouched.
fn substitute_value(value: serde_yaml::Value) -> Result<serde_yaml::Value, RunbookParseError> {
    match value {
        serde_yaml::Value::String(s) => Ok(serde_yaml::Value::String(substitute_env_vars(&s)?)),
        serde_yaml::Value::Sequence(items) => {
            Ok(serde_yaml::Value::Sequence(items.into_iter().map(substitute_value).collect::<Result<_, _>>()?))
        }
        serde_yaml::Value::Mapping(map) => {
            let mut substituted = serde_yaml::Mapping::with_capacity(map.len());
            for (key, value) in map {
                substituted.insert(substitute_value(key)?, substitute_value(value)?);
            }
            Ok(serde_yaml::Value::Mapping(substituted))
        }
        other => Ok(other),
    }
}

/// Parses a runbook from its YAML file at `path`, substituting every
/// `${IDENT}` reference with the corresponding environment variable.
///
/// # Errors
///
/// See [`RunbookParseError`]: I/O failure reading `path`, invalid YAML,
/// an undefined referenced variable, a document that does not match the
/// `Runbook` shape, or a structural invariant violation (e.g. no artifacts).
pub fn parse(path: &Path) -> Result<Runbook, RunbookParseError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| RunbookParseError::Io { path: path.display().to_string(), source })?;
    parse_str(&text, &path.display().to_string())
}

/// Parses a runbook from already-read YAML `text`, substituting every
/// `${IDENT}` reference. `label` identifies the source for error messages
/// (a file path, or a description of a sandboxed read) without this
/// function performing any I/O of its own — callers that must confine their
/// read to a sandboxed directory (e.g. the child-runbook resolver) read the
/// bytes themselves and hand the text here.
///
/// # Errors
///
/// See [`RunbookParseError`]: invalid YAML, an undefined referenced
/// variable, a document that does not match the `Runbook` shape, or a
/// structural invariant violation.
pub fn parse_str(text: &str, label: &str) -> Result<Runbook, RunbookParseError> {
    let raw: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|source| RunbookParseError::Yaml { path: label.to_owned(), source })?;
    let substituted = substitute_value(raw)?;
    let runbook: Runbook =
        serde_yaml::from_value(substituted).map_err(|err| RunbookParseError::Structure(StructureMismatch(err.to_string())))?;
    runbook.validate_structure()?;
    Ok(runbook)
}

/// Parses a runbook from an already-constructed JSON value, performing **no**
/// environment variable substitution. Intended for tests and programmatic
/// runbook construction (spec.md §4.5).
///
/// # Errors
///
/// Returns [`RunbookParseError::Structure`] when `value` does not match the
/// `Runbook` shape, or [`RunbookParseError::Invariant`] when it does but
/// violates a structural invariant.
pub fn parse_from_dict(value: serde_json::Value) -> Result<Runbook, RunbookParseError> {
    let runbook: Runbook =
        serde_json::from_value(value).map_err(|err| RunbookParseError::Structure(StructureMismatch(err.to_string())))?;
    runbook.validate_structure()?;
    Ok(runbook)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::parse;
    use super::parse_from_dict;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn write_runbook(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("runbook.yaml");
        std::fs::write(&path, contents).expect("write");
        path
    }

    #[test]
    #[allow(unsafe_code, reason = "std::env::set_var is unsafe starting in edition 2024; ENV_LOCK serialises access")]
    fn substitutes_env_var_references() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        unsafe {
            std::env::set_var("CP_TEST_PATH", "/tmp/data");
        }
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write_runbook(
            &dir,
            r"
name: test
description: test
artifacts:
  a:
    source:
      type: filesystem
      properties:
        path: ${CP_TEST_PATH}
",
        );
        let runbook = parse(&path).expect("parses");
        let artifact = &runbook.artifacts[&"a".parse().expect("valid id")];
        let properties = match &artifact.kind {
            cp_core::runbook_model::ArtifactKind::Source { source } => &source.properties,
            cp_core::runbook_model::ArtifactKind::Derived { .. } => unreachable!(),
        };
        assert_eq!(properties["path"], serde_json::json!("/tmp/data"));
        unsafe {
            std::env::remove_var("CP_TEST_PATH");
        }
    }

    #[test]
    fn missing_env_var_fails_with_its_name() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write_runbook(
            &dir,
            r"
name: test
description: test
artifacts:
  a:
    source:
      type: filesystem
      properties:
        path: ${CP_DEFINITELY_UNSET_VAR}
",
        );
        let err = parse(&path).expect_err("missing var");
        assert!(err.to_string().contains("CP_DEFINITELY_UNSET_VAR"));
    }

    #[test]
    fn parse_from_dict_skips_substitution() {
        let value = serde_json::json!({
            "name": "test",
            "description": "test",
            "artifacts": {
                "a": {
                    "source": {"type": "filesystem", "properties": {"path": "${NOT_SUBSTITUTED}"}}
                }
            }
        });
        let runbook = parse_from_dict(value).expect("parses");
        let artifact = &runbook.artifacts[&"a".parse().expect("valid id")];
        let properties = match &artifact.kind {
            cp_core::runbook_model::ArtifactKind::Source { source } => &source.properties,
            cp_core::runbook_model::ArtifactKind::Derived { .. } => unreachable!(),
        };
        assert_eq!(properties["path"], serde_json::json!("${NOT_SUBSTITUTED}"));
    }

    #[test]
    fn empty_artifacts_is_rejected() {
        let value = serde_json::json!({"name": "test", "description": "test", "artifacts": {}});
        let err = parse_from_dict(value).expect_err("no artifacts");
        assert!(matches!(err, super::RunbookParseError::Invariant(_)));
    }

    #[test]
    fn duplicate_artifact_id_is_rejected_as_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write_runbook(
            &dir,
            r"
name: test
description: test
artifacts:
  a:
    source: { type: fs, properties: {} }
  a:
    source: { type: fs, properties: {} }
",
        );
        assert!(parse(&path).is_err());
    }
}
