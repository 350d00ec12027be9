//! UDP datagram connector configuration.
//!
//! ```yaml
//! settings:
//!   packet_size: 256
//!   command_timeout: 2.0
//! mappings:
//!   commands:
//!     camera:
//!       temperature: CCD.TEMP
//! actions:
//!   expose:
//!     - { component: camera, variable: exposure, value: "{duration}" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::datagram::OKAY_PREFIX_LEN;

use super::mapping::{ActionMap, ActionStep, CommandDefinition, Mappings};
use super::{ensure_positive, seconds};

// ============================================================================
// Constants
// ============================================================================

/// Default wait for a datagram reply.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// DatagramSettings
// ============================================================================

/// The `settings` section of a datagram document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatagramSettings {
    /// Exact size of every request datagram.
    pub packet_size: usize,

    /// Reply wait per command.
    #[serde(with = "seconds", default = "default_command_timeout")]
    pub command_timeout: Duration,
}

fn default_command_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

// ============================================================================
// DatagramConfig
// ============================================================================

/// Complete configuration of a UDP datagram connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatagramConfig {
    /// Packet and timeout settings.
    pub settings: DatagramSettings,

    /// Command table; resource locks are ignored by this variant.
    #[serde(default)]
    pub mappings: Mappings,

    /// Macro table.
    #[serde(default)]
    pub actions: ActionMap,
}

impl DatagramConfig {
    /// Creates a configuration with the given packet size.
    #[must_use]
    pub fn new(packet_size: usize) -> Self {
        Self {
            settings: DatagramSettings {
                packet_size,
                command_timeout: DEFAULT_COMMAND_TIMEOUT,
            },
            mappings: Mappings::default(),
            actions: ActionMap::default(),
        }
    }

    /// Parses and validates a YAML document.
    ///
    /// # Errors
    ///
    /// - [`Error::Yaml`] if the document does not parse
    /// - [`Error::Config`] if validation fails
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        super::parse_yaml(yaml, Self::validate)
    }

    /// Reads, parses and validates a YAML file.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the file cannot be read or fails validation
    /// - [`Error::Yaml`] if the document does not parse
    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Result<Self> {
        let yaml = super::read_config_file(path.into())?;
        Self::from_yaml_str(&yaml)
    }

    /// Checks semantic constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the packet cannot hold a success reply or
    /// the command timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.settings.packet_size <= OKAY_PREFIX_LEN {
            return Err(Error::config(format!(
                "packet_size must exceed {OKAY_PREFIX_LEN} bytes, got {}",
                self.settings.packet_size
            )));
        }
        ensure_positive("command_timeout", self.settings.command_timeout)
    }

    /// Sets the reply wait.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.settings.command_timeout = timeout;
        self
    }

    /// Maps `kind.variable` to a protocol command.
    #[must_use]
    pub fn with_command(
        mut self,
        kind: impl Into<String>,
        variable: impl Into<String>,
        definition: CommandDefinition,
    ) -> Self {
        self.mappings.commands.insert(kind, variable, definition);
        self
    }

    /// Adds a named action.
    #[must_use]
    pub fn with_action(mut self, name: impl Into<String>, steps: Vec<ActionStep>) -> Self {
        self.actions.insert(name, steps);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let yaml = r#"
settings:
  packet_size: 128
  command_timeout: 0.5
mappings:
  commands:
    camera:
      temperature: CCD.TEMP
actions:
  cool:
    - { component: camera, variable: temperature, value: "{target}" }
"#;
        let config = DatagramConfig::from_yaml_str(yaml).expect("parse");
        assert_eq!(config.settings.packet_size, 128);
        assert_eq!(config.settings.command_timeout, Duration::from_millis(500));
        assert!(config.mappings.commands.lookup("camera", "temperature").is_ok());
    }

    #[test]
    fn test_packet_size_required() {
        assert!(DatagramConfig::from_yaml_str("settings: { command_timeout: 1 }").is_err());
    }

    #[test]
    fn test_tiny_packet_rejected() {
        let err = DatagramConfig::new(OKAY_PREFIX_LEN).validate().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(DatagramConfig::new(64).validate().is_ok());
    }
}
