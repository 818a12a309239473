// crates/cp-core/src/ruleset.rs
// ============================================================================
// Module: Ruleset Registry
// Description: Process-wide typed registry of rule packages by (name, version).
// Purpose: Let analysers and classifiers register and retrieve pattern/rule
//          packages with a type check enforced at lookup, not at use.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! A ruleset is an opaque, type-erased class registered under
//! `(ruleset_name, ruleset_version)` together with the [`RuleType`] it
//! implements. [`RulesetRegistry::get`] downcasts to the caller's expected
//! type, failing distinctly when the key is unknown versus when it is known
//! but tagged with a different [`RuleType`]. Registration is idempotent for
//! the exact same class (checked by [`std::any::TypeId`]); registering a
//! genuinely different class under an already-used key is a conflict.
//! [`RulesetRegistry::snapshot`] / [`RulesetRegistry::restore`] exist purely
//! for test isolation: tests that register fixture rulesets can restore the
//! registry to its pre-test contents afterwards instead of leaking global
//! state across test binaries.

use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use thiserror::Error;

use crate::identifiers::SchemaName;
use crate::schema::SchemaVersion;

/// Closed enumeration of rule package kinds a ruleset may be tagged with.
///
/// The spec leaves the concrete set of rule kinds to the analysers that are
/// out of this core's scope; this enumeration names the kinds the core
/// itself needs to discriminate at the registry boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
    /// Pattern-matching rules (regex/keyword style detectors).
    PatternMatching,
    /// LLM-prompt-shaped validation rules.
    LlmValidation,
    /// Jurisdiction-classification rules.
    Classification,
}

/// Error returned by [`RulesetRegistry::get`] or
/// [`RulesetRegistry::register`].
#[derive(Debug, Error)]
pub enum RulesetError {
    /// No ruleset is registered under the requested `(name, version)`.
    #[error("ruleset '{name}/{version}' is not registered")]
    NotFound {
        /// Requested ruleset name.
        name: SchemaName,
        /// Requested ruleset version.
        version: SchemaVersion,
    },
    /// The registered ruleset's [`RuleType`] does not match what the caller
    /// expected.
    #[error("ruleset '{name}/{version}' is registered as {registered:?}, not {expected:?}")]
    TypeMismatch {
        /// Requested ruleset name.
        name: SchemaName,
        /// Requested ruleset version.
        version: SchemaVersion,
        /// The type the caller expected.
        expected: RuleType,
        /// The type actually registered.
        registered: RuleType,
    },
    /// A different class is already registered under this key.
    #[error("a different ruleset class is already registered under '{name}/{version}'")]
    Conflict {
        /// Ruleset name in conflict.
        name: SchemaName,
        /// Ruleset version in conflict.
        version: SchemaVersion,
    },
}

struct RulesetEntry {
    rule_type: RuleType,
    type_id: TypeId,
    class: Arc<dyn Any + Send + Sync>,
}

/// Process-wide typed registry of rule packages.
///
/// # Invariants
/// - At most one class is registered per `(name, version)` key.
/// - Registering the identical class (by `TypeId`) under an existing key is
///   a no-op, not an error.
#[derive(Default)]
pub struct RulesetRegistry {
    entries: Mutex<HashMap<(SchemaName, SchemaVersion), RulesetEntry>>,
}

impl RulesetRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `class` under `(name, version)` as a `rule_type` package.
    ///
    /// # Errors
    ///
    /// Returns [`RulesetError::Conflict`] when a different class is already
    /// registered under the same key. Re-registering the exact same class
    /// (same `TypeId`) is idempotent and returns `Ok`.
    pub fn register<R: Send + Sync + 'static>(
        &self,
        name: SchemaName,
        version: SchemaVersion,
        rule_type: RuleType,
        class: Arc<R>,
    ) -> Result<(), RulesetError> {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let key = (name, version);
        let type_id = TypeId::of::<R>();
        if let Some(existing) = entries.get(&key) {
            if existing.type_id == type_id && existing.rule_type == rule_type {
                return Ok(());
            }
            return Err(RulesetError::Conflict { name: key.0, version: key.1 });
        }
        entries.insert(key, RulesetEntry { rule_type, type_id, class });
        Ok(())
    }

    /// Retrieves a previously registered ruleset, downcast to `R`.
    ///
    /// # Errors
    ///
    /// Returns [`RulesetError::NotFound`] when the key is unregistered, and
    /// [`RulesetError::TypeMismatch`] when it is registered under a
    /// different [`RuleType`] than `expected`.
    pub fn get<R: Send + Sync + 'static>(
        &self,
        name: &SchemaName,
        version: SchemaVersion,
        expected: RuleType,
    ) -> Result<Arc<R>, RulesetError> {
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let key = (name.clone(), version);
        let Some(entry) = entries.get(&key) else {
            return Err(RulesetError::NotFound { name: key.0, version: key.1 });
        };
        if entry.rule_type != expected {
            return Err(RulesetError::TypeMismatch {
                name: key.0,
                version: key.1,
                expected,
                registered: entry.rule_type,
            });
        }
        Arc::clone(&entry.class).downcast::<R>().map_err(|_| RulesetError::TypeMismatch {
            name: name.clone(),
            version,
            expected,
            registered: entry.rule_type,
        })
    }

    /// Captures the full registry contents for later restoration.
    ///
    /// Intended for test isolation: a test snapshots before registering
    /// fixture rulesets and restores afterwards so the process-wide
    /// registry does not leak state into unrelated tests.
    #[must_use]
    pub fn snapshot(&self) -> RulesetSnapshot {
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        RulesetSnapshot {
            entries: entries
                .iter()
                .map(|(key, entry)| {
                    (key.clone(), RulesetEntry { rule_type: entry.rule_type, type_id: entry.type_id, class: Arc::clone(&entry.class) })
                })
                .collect(),
        }
    }

    /// Restores a previously captured snapshot, discarding any registrations
    /// made since it was taken.
    pub fn restore(&self, snapshot: RulesetSnapshot) {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *entries = snapshot.entries;
    }

    /// Lists every registered `(name, version, rule_type)` triple, sorted by
    /// name then version. Backs the CLI's `list rulesets` verb.
    #[must_use]
    pub fn list(&self) -> Vec<(SchemaName, SchemaVersion, RuleType)> {
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut rows: Vec<_> = entries.iter().map(|((name, version), entry)| (name.clone(), *version, entry.rule_type)).collect();
        rows.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()).then(a.1.cmp(&b.1)));
        rows
    }
}

/// Opaque capture of a [`RulesetRegistry`]'s contents at a point in time.
pub struct RulesetSnapshot {
    entries: HashMap<(SchemaName, SchemaVersion), RulesetEntry>,
}
