// crates/cp-core/src/message.rs
// ============================================================================
// Module: Message Envelope
// Description: Wire-level envelope carrying artifact content between components.
// Purpose: Attach execution provenance to content without coupling content to it.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! A [`Message`] pairs content with the [`Schema`] it claims to satisfy and an
//! [`ExecutionContext`] describing how it came to exist. Convenience
//! projections (`is_success`, `execution_error`, ...) mirror the original
//! implementation's `Message` properties.

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::identifiers::RunId;
use crate::schema::Schema;

/// Status of the execution that produced a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Execution has not yet completed.
    Pending,
    /// Execution completed without error.
    Success,
    /// Execution completed with an error.
    Error,
}

/// Provenance of a single artifact's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Current execution status.
    pub status: ExecutionStatus,
    /// Error message, set only when `status` is [`ExecutionStatus::Error`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the execution, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Origin of this message; `"parent"` unless produced by a child runbook.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Alias under which a child runbook's outputs were imported, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

fn default_origin() -> String {
    "parent".to_owned()
}

impl ExecutionContext {
    /// Builds a context in the [`ExecutionStatus::Pending`] state.
    #[must_use]
    pub fn pending() -> Self {
        Self { status: ExecutionStatus::Pending, error: None, duration_seconds: None, origin: default_origin(), alias: None }
    }

    /// Builds a context reporting success with the given duration.
    #[must_use]
    pub fn success(duration_seconds: f64) -> Self {
        Self { status: ExecutionStatus::Success, error: None, duration_seconds: Some(duration_seconds), origin: default_origin(), alias: None }
    }

    /// Builds a context reporting an error with the given duration.
    #[must_use]
    pub fn error(message: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            status: ExecutionStatus::Error,
            error: Some(message.into()),
            duration_seconds: Some(duration_seconds),
            origin: default_origin(),
            alias: None,
        }
    }

    /// Marks this context as originating from an imported child runbook
    /// named `child_name`, importing under `alias` in the parent.
    #[must_use]
    pub fn with_child_origin(mut self, child_name: &str, alias: impl Into<String>) -> Self {
        self.origin = format!("child:{child_name}");
        self.alias = Some(alias.into());
        self
    }
}

/// Extension envelope wrapping execution provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageExtensions {
    /// Execution provenance for the artifact this message carries.
    pub execution: ExecutionContext,
}

/// Content envelope produced or consumed by a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Identifier of the artifact this message represents.
    pub id: String,
    /// Opaque content payload.
    pub content: serde_json::Value,
    /// Schema the content claims to satisfy.
    pub schema: Schema,
    /// Run this message belongs to.
    pub run_id: RunId,
    /// Artifact id of the component that produced this message, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Timestamp at which the message was created.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Free-form contextual metadata carried alongside the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Map<String, serde_json::Value>>,
    /// Execution provenance and related extensions.
    pub extensions: MessageExtensions,
}

impl Message {
    /// Returns `true` when the producing execution succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.extensions.execution.status == ExecutionStatus::Success
    }

    /// Returns the error message, if the producing execution failed.
    #[must_use]
    pub fn execution_error(&self) -> Option<&str> {
        self.extensions.execution.error.as_deref()
    }

    /// Returns the producing execution's duration, in seconds.
    #[must_use]
    pub fn execution_duration(&self) -> Option<f64> {
        self.extensions.execution.duration_seconds
    }

    /// Returns the origin of the producing execution.
    #[must_use]
    pub fn execution_origin(&self) -> &str {
        &self.extensions.execution.origin
    }

    /// Returns the alias under which this message was imported, if any.
    #[must_use]
    pub fn execution_alias(&self) -> Option<&str> {
        self.extensions.execution.alias.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::ExecutionContext;
    use super::ExecutionStatus;

    #[test]
    fn error_context_carries_message_and_status() {
        let ctx = ExecutionContext::error("boom", 0.5);
        assert_eq!(ctx.status, ExecutionStatus::Error);
        assert_eq!(ctx.error.as_deref(), Some("boom"));
    }

    #[test]
    fn child_origin_sets_alias() {
        let ctx = ExecutionContext::success(1.0).with_child_origin("nested_runbook", "parent_artifact");
        assert_eq!(ctx.origin, "child:nested_runbook");
        assert_eq!(ctx.alias.as_deref(), Some("parent_artifact"));
    }
}
