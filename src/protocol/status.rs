//! Structured results of `put` and `call`.
//!
//! # Format
//!
//! Success:
//! ```json
//! { "status": "ok", "value_set": 12.5, "response": "OK" }
//! ```
//!
//! Action success:
//! ```json
//! { "status": "completed", "action": "slew", "response": "OK" }
//! ```
//!
//! Failure:
//! ```json
//! { "status": "failed", "error": "Command failed: SET MOUNT.RA=1" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// StatusKind
// ============================================================================

/// Status discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// Primitive command accepted.
    Ok,
    /// Action ran every step.
    Completed,
    /// Command or action failed; see `error`.
    Failed,
    /// No action with the requested name.
    UnknownFunction,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::UnknownFunction => "unknown_function",
        })
    }
}

// ============================================================================
// CommandStatus
// ============================================================================

/// Result of a `put` or `call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandStatus {
    /// Outcome.
    pub status: StatusKind,

    /// Action name, for `call` results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Value written by a `put`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_set: Option<Value>,

    /// Peer response of the last primitive command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandStatus {
    fn with_kind(status: StatusKind) -> Self {
        Self {
            status,
            action: None,
            value_set: None,
            response: None,
            error: None,
        }
    }

    /// Successful primitive write.
    #[must_use]
    pub fn ok(value_set: Value, response: impl Into<String>) -> Self {
        Self {
            value_set: Some(value_set),
            response: Some(response.into()),
            ..Self::with_kind(StatusKind::Ok)
        }
    }

    /// Successful action; `response` is the last step's reply.
    #[must_use]
    pub fn completed(action: impl Into<String>, response: Option<String>) -> Self {
        Self {
            action: Some(action.into()),
            response,
            ..Self::with_kind(StatusKind::Completed)
        }
    }

    /// Failure carrying the cause.
    #[must_use]
    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::with_kind(StatusKind::Failed)
        }
    }

    /// Unknown action.
    #[must_use]
    pub fn unknown_function(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..Self::with_kind(StatusKind::UnknownFunction)
        }
    }

    /// Attaches an action name.
    #[inline]
    #[must_use]
    pub fn for_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Returns `true` for `ok` and `completed`.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, StatusKind::Ok | StatusKind::Completed)
    }

    /// Returns `true` for `failed` and `unknown_function`.
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }
}

// ============================================================================
// Tests
// ============================================================================
