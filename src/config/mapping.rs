//! Command, resource-lock and action maps.
//!
//! These tables are read-only after load and shared freely between
//! concurrent commands.
//!
//! ```yaml
//! mappings:
//!   commands:
//!     telescope:
//!       rightascension: MOUNT.RA
//!       tracking: { command: MOUNT.TRACK, value: "1" }
//!   resource_locks:
//!     MOUNT.RA: mount_axes
//! actions:
//!   slew:
//!     - { component: telescope, variable: rightascension, value: "{ra}" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Placeholders
// ============================================================================

/// Returns the argument name of a `{name}` placeholder value.
///
/// Non-string values and strings without surrounding braces are literals.
#[must_use]
pub fn placeholder_name(value: &Value) -> Option<&str> {
    value
        .as_str()?
        .strip_prefix('{')?
        .strip_suffix('}')
        .filter(|name| !name.is_empty())
}

// ============================================================================
// CommandDefinition
// ============================================================================

/// Wire command for one (component kind, variable) pair.
///
/// Accepts either a bare command string or a `{command, value}` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDefinition")]
pub struct CommandDefinition {
    /// Protocol command name, e.g. `MOUNT.RA`.
    pub command: String,
    /// Fixed value or `{placeholder}` used by `put` when the caller supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl CommandDefinition {
    /// Creates a definition without a default value.
    #[inline]
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            value: None,
        }
    }

    /// Attaches a fixed or placeholder value.
    #[inline]
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDefinition {
    Bare(String),
    Full {
        command: String,
        #[serde(default)]
        value: Option<Value>,
    },
}

impl From<RawDefinition> for CommandDefinition {
    fn from(raw: RawDefinition) -> Self {
        match raw {
            RawDefinition::Bare(command) => Self::new(command),
            RawDefinition::Full { command, value } => Self { command, value },
        }
    }
}

// ============================================================================
// CommandMap
// ============================================================================

/// `{kind: {variable: definition}}` lookup table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandMap(FxHashMap<String, FxHashMap<String, CommandDefinition>>);

impl CommandMap {
    /// Creates an empty map.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition.
    pub fn insert(
        &mut self,
        kind: impl Into<String>,
        variable: impl Into<String>,
        definition: CommandDefinition,
    ) {
        self.0
            .entry(kind.into())
            .or_default()
            .insert(variable.into(), definition);
    }

    /// Looks up the definition for `kind.variable`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCommand`] if either level is missing.
    pub fn lookup(&self, kind: &str, variable: &str) -> Result<&CommandDefinition> {
        self.0
            .get(kind)
            .and_then(|variables| variables.get(variable))
            .ok_or_else(|| Error::unknown_command(kind, variable))
    }

    /// Total number of definitions across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.values().map(FxHashMap::len).sum()
    }

    /// Returns `true` when no definitions are configured.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// ResourceLockMap
// ============================================================================

/// `{command: resource_name}` table for semantic serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceLockMap(FxHashMap<String, String>);

impl ResourceLockMap {
    /// Creates an empty map.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a command to a resource.
    pub fn insert(&mut self, command: impl Into<String>, resource: impl Into<String>) {
        self.0.insert(command.into(), resource.into());
    }

    /// Resource guarding `command`, if any.
    #[inline]
    #[must_use]
    pub fn resource_for(&self, command: &str) -> Option<&str> {
        self.0.get(command).map(String::as_str)
    }

    /// Distinct resource names.
    #[must_use]
    pub fn resources(&self) -> FxHashSet<&str> {
        self.0.values().map(String::as_str).collect()
    }
}

// ============================================================================
// Actions
// ============================================================================

/// One primitive step of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    /// Component kind for this step; the caller's component when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Variable issued as a `put`.
    pub variable: String,
    /// Literal value or `{placeholder}`; the definition default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ActionStep {
    /// Creates a step with a literal or placeholder value.
    #[must_use]
    pub fn new(
        component: impl Into<String>,
        variable: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            component: Some(component.into()),
            variable: variable.into(),
            value: Some(value.into()),
        }
    }

    /// Placeholder argument this step requires, if any.
    #[inline]
    #[must_use]
    pub fn placeholder(&self) -> Option<&str> {
        self.value.as_ref().and_then(placeholder_name)
    }
}

/// `{name: [steps]}` macro table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionMap(FxHashMap<String, Vec<ActionStep>>);

impl ActionMap {
    /// Creates an empty map.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an action.
    pub fn insert(&mut self, name: impl Into<String>, steps: Vec<ActionStep>) {
        self.0.insert(name.into(), steps);
    }

    /// Steps of the named action.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[ActionStep]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// Action names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

// ============================================================================
// Mappings
// ============================================================================

/// The `mappings` section of a protocol document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mappings {
    /// Command table.
    #[serde(default)]
    pub commands: CommandMap,
    /// Resource lock table.
    #[serde(default)]
    pub resource_locks: ResourceLockMap,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_name() {
        assert_eq!(placeholder_name(&Value::from("{ra}")), Some("ra"));
        assert_eq!(placeholder_name(&Value::from("ra")), None);
        assert_eq!(placeholder_name(&Value::from("{}")), None);
        assert_eq!(placeholder_name(&Value::from(12.5)), None);
    }

    #[test]
    fn test_definition_bare_and_table() {
        let yaml = r#"
telescope:
  rightascension: MOUNT.RA
  tracking: { command: MOUNT.TRACK, value: "1" }
"#;
        let map: CommandMap = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(map.len(), 2);

        let ra = map.lookup("telescope", "rightascension").expect("ra");
        assert_eq!(ra.command, "MOUNT.RA");
        assert!(ra.value.is_none());

        let tracking = map.lookup("telescope", "tracking").expect("tracking");
        assert_eq!(tracking.value, Some(Value::from("1")));
    }

    #[test]
    fn test_lookup_unknown() {
        let mut map = CommandMap::new();
        map.insert("telescope", "rightascension", CommandDefinition::new("MOUNT.RA"));

        let err = map.lookup("telescope", "azimuth").unwrap_err();
        assert!(matches!(err, Error::UnknownCommand { .. }));
        assert!(map.lookup("dome", "rightascension").is_err());
    }

    #[test]
    fn test_resource_lock_distinct_names() {
        let mut locks = ResourceLockMap::new();
        locks.insert("MOUNT.RA", "mount_axes");
        locks.insert("MOUNT.DEC", "mount_axes");
        locks.insert("FOCUS.POS", "focuser");

        assert_eq!(locks.resources().len(), 2);
        assert_eq!(locks.resource_for("MOUNT.DEC"), Some("mount_axes"));
        assert_eq!(locks.resource_for("CCD.TEMP"), None);
    }

    #[test]
    fn test_action_step_placeholder() {
        let yaml = r#"
slew:
  - { component: telescope, variable: rightascension, value: "{ra}" }
  - { variable: tracking, value: 1 }
  - { variable: park }
"#;
        let actions: ActionMap = serde_yaml::from_str(yaml).expect("parse");
        let steps = actions.get("slew").expect("slew");
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].placeholder(), Some("ra"));
        assert_eq!(steps[1].placeholder(), None);
        assert!(steps[1].component.is_none());
        assert!(steps[2].value.is_none());
    }
}
