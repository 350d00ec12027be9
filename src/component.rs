//! Component handles and call arguments.
//!
//! A [`Component`] is the opaque target the routing layer hands to a
//! connector: it only needs a device `kind` (used to pick a command map
//! section) and a display `name` (used in logs).
//!
//! [`Arguments`] carries the caller's named values in insertion order, since
//! `put` sends the *first* supplied value on the wire.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Standard Kinds
// ============================================================================

/// Protocol-agnostic component kinds shared by every instrument family.
pub mod kinds {
    /// Telescope mount.
    pub const MOUNT: &str = "telescope";
    /// Dome.
    pub const DOME: &str = "dome";
    /// Camera.
    pub const CAMERA: &str = "camera";
    /// Filter wheel.
    pub const FILTERWHEEL: &str = "filterwheel";
    /// Focuser.
    pub const FOCUSER: &str = "focuser";
    /// Field rotator.
    pub const ROTATOR: &str = "rotator";
    /// Generic switch (lamps, optical switches).
    pub const SWITCH: &str = "switch";
    /// Safety monitor.
    pub const SAFETYMONITOR: &str = "safetymonitor";
    /// Cover calibrator.
    pub const COVERCALIBRATOR: &str = "covercalibrator";
    /// Tertiary mirror.
    pub const TERTIARY: &str = "tertiary";

    /// All standard kinds.
    pub const ALL: &[&str] = &[
        MOUNT,
        DOME,
        CAMERA,
        FILTERWHEEL,
        FOCUSER,
        ROTATOR,
        SWITCH,
        SAFETYMONITOR,
        COVERCALIBRATOR,
        TERTIARY,
    ];
}

// ============================================================================
// Component
// ============================================================================

/// Target of a connector operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Component {
    /// Device category, e.g. `telescope`, `camera`.
    pub kind: String,
    /// Display name used in logs.
    pub name: String,
}

impl Component {
    /// Creates a component of arbitrary kind.
    #[inline]
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Creates a telescope mount component.
    #[inline]
    #[must_use]
    pub fn telescope(name: impl Into<String>) -> Self {
        Self::new(kinds::MOUNT, name)
    }

    /// Creates a camera component.
    #[inline]
    #[must_use]
    pub fn camera(name: impl Into<String>) -> Self {
        Self::new(kinds::CAMERA, name)
    }

    /// Returns `true` for one of the [`kinds::ALL`] categories.
    #[inline]
    #[must_use]
    pub fn is_standard_kind(&self) -> bool {
        kinds::ALL.contains(&self.kind.as_str())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

// ============================================================================
// Arguments
// ============================================================================

/// Ordered named arguments for `get`/`put`/`call`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    entries: Vec<(String, Value)>,
}

impl Arguments {
    /// Creates an empty argument list.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a named argument.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts a named argument, replacing an existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Looks up an argument by name.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// First argument in insertion order.
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        self.entries.first().map(|(_, v)| v)
    }

    /// Returns `true` when no arguments were supplied.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of arguments.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates arguments in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = Self::new();
        for (k, v) in iter {
            args.insert(k, v);
        }
        args
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_display() {
        let mount = Component::telescope("main mount");
        assert_eq!(mount.to_string(), "main mount (telescope)");
        assert!(mount.is_standard_kind());
        assert!(!Component::new("spectrograph", "beso").is_standard_kind());
    }

    #[test]
    fn test_arguments_keep_insertion_order() {
        let args = Arguments::new().with("dec", -24.5).with("ra", 15.5);
        assert_eq!(args.first(), Some(&Value::from(-24.5)));
        let names: Vec<&str> = args.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["dec", "ra"]);
    }

    #[test]
    fn test_arguments_replace_in_place() {
        let args = Arguments::new().with("a", 1).with("b", 2).with("a", 3);
        assert_eq!(args.len(), 2);
        assert_eq!(args.first(), Some(&Value::from(3)));
        assert_eq!(args.get("b"), Some(&Value::from(2)));
        assert_eq!(args.get("missing"), None);
    }

    #[test]
    fn test_arguments_from_iter() {
        let args: Arguments = [("Position", "science")].into_iter().collect();
        assert_eq!(args.get("Position"), Some(&Value::from("science")));
    }
}
