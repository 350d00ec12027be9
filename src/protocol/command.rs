//! Wire command text.
//!
//! Semantic verbs become one of two command shapes:
//!
//! | Verb | Text |
//! |------|------|
//! | `get` | `GET <command>` |
//! | `put` | `SET <command>=<value>` |
//!
//! The same text is framed by [`super::line`] for TCP and by
//! [`super::datagram`] for UDP.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;

use crate::config::CommandDefinition;

// ============================================================================
// Verb
// ============================================================================

/// Wire verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Read a value.
    Get,
    /// Write a value.
    Set,
}

impl Verb {
    /// Keyword sent on the wire.
    #[inline]
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Set => "SET",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

// ============================================================================
// WireCommand
// ============================================================================

/// One protocol command ready to be framed.
///
/// # Example
///
/// ```ignore
/// let def = CommandDefinition::new("MOUNT.RA");
/// assert_eq!(WireCommand::get(&def).text(), "GET MOUNT.RA");
/// assert_eq!(WireCommand::set(&def, &12.5.into()).text(), "SET MOUNT.RA=12.5");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireCommand {
    verb: Verb,
    name: String,
    text: String,
}

impl WireCommand {
    /// Builds `GET <command>`.
    #[must_use]
    pub fn get(definition: &CommandDefinition) -> Self {
        Self {
            verb: Verb::Get,
            name: definition.command.clone(),
            text: format!("{} {}", Verb::Get, definition.command),
        }
    }

    /// Builds `SET <command>=<value>`.
    #[must_use]
    pub fn set(definition: &CommandDefinition, value: &Value) -> Self {
        Self {
            verb: Verb::Set,
            name: definition.command.clone(),
            text: format!("{} {}={}", Verb::Set, definition.command, wire_value(value)),
        }
    }

    /// Wire verb.
    #[inline]
    #[must_use]
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Protocol command name, e.g. `MOUNT.RA`; the resource-lock key.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full command text without framing.
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for WireCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ============================================================================
// Value Rendering
// ============================================================================

/// Renders a value as it appears after `=`.
///
/// Strings go out raw; everything else uses its JSON form (`true`, `12.5`).
#[must_use]
pub fn wire_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
