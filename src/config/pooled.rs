//! Pooled TCP connector configuration.
//!
//! # Example
//!
//! ```yaml
//! settings:
//!   connection_pool_size: 4
//!   id_pool_range: [1, 32]
//!   timeouts:
//!     connection: 5.0
//!     get_command: 2.0
//!     set_command: 10.0
//!     pool_get: 3.0
//! mappings:
//!   commands:
//!     telescope:
//!       rightascension: MOUNT.RA
//!   resource_locks:
//!     MOUNT.RA: mount_axes
//! actions: {}
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identifiers::IdRange;

use super::mapping::{ActionMap, ActionStep, CommandDefinition, Mappings};
use super::{ensure_positive, seconds, seconds_opt};

// ============================================================================
// Constants
// ============================================================================

/// Default TCP connect timeout.
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default response timeout for GET commands.
const DEFAULT_GET_TIMEOUT: Duration = Duration::from_secs(5);

/// Default response timeout for SET commands.
const DEFAULT_SET_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for a pooled connection or correlation ID.
const DEFAULT_POOL_GET_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of pooled sessions.
const DEFAULT_POOL_SIZE: usize = 4;

// ============================================================================
// Timeouts
// ============================================================================

/// Per-stage deadlines, in seconds on the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// TCP connect for each pooled session.
    #[serde(with = "seconds", default = "default_connection")]
    pub connection: Duration,

    /// Response wait for GET commands.
    #[serde(rename = "get_command", alias = "get", with = "seconds", default = "default_get")]
    pub get: Duration,

    /// Response wait for SET commands.
    #[serde(rename = "set_command", alias = "set", with = "seconds", default = "default_set")]
    pub set: Duration,

    /// Wait for a free connection or correlation ID.
    #[serde(with = "seconds", default = "default_pool_get")]
    pub pool_get: Duration,

    /// Wait for a resource lock; unbounded when absent.
    #[serde(
        with = "seconds_opt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub resource_lock: Option<Duration>,
}

fn default_connection() -> Duration {
    DEFAULT_CONNECTION_TIMEOUT
}

fn default_get() -> Duration {
    DEFAULT_GET_TIMEOUT
}

fn default_set() -> Duration {
    DEFAULT_SET_TIMEOUT
}

fn default_pool_get() -> Duration {
    DEFAULT_POOL_GET_TIMEOUT
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connection: DEFAULT_CONNECTION_TIMEOUT,
            get: DEFAULT_GET_TIMEOUT,
            set: DEFAULT_SET_TIMEOUT,
            pool_get: DEFAULT_POOL_GET_TIMEOUT,
            resource_lock: None,
        }
    }
}

impl Timeouts {
    /// Sets every timeout to the same value; handy for tests.
    #[must_use]
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            connection: timeout,
            get: timeout,
            set: timeout,
            pool_get: timeout,
            resource_lock: None,
        }
    }

    /// Bounds the wait for a resource lock.
    #[inline]
    #[must_use]
    pub fn with_resource_lock(mut self, timeout: Duration) -> Self {
        self.resource_lock = Some(timeout);
        self
    }

    fn validate(&self) -> Result<()> {
        ensure_positive("timeouts.connection", self.connection)?;
        ensure_positive("timeouts.get_command", self.get)?;
        ensure_positive("timeouts.set_command", self.set)?;
        ensure_positive("timeouts.pool_get", self.pool_get)?;
        if let Some(lock) = self.resource_lock {
            ensure_positive("timeouts.resource_lock", lock)?;
        }
        Ok(())
    }
}

// ============================================================================
// TlsSettings
// ============================================================================

/// Client side of the in-band TLS upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    /// Name checked against the server certificate; the connect host when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Extra PEM bundle of trusted CA certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,

    /// Trust the platform certificate store.
    #[serde(default = "default_true")]
    pub system_roots: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            server_name: None,
            ca_file: None,
            system_roots: true,
        }
    }
}

// ============================================================================
// PoolSettings
// ============================================================================

/// The `settings` section of a pooled TCP document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Number of sessions opened at connect time.
    #[serde(rename = "connection_pool_size", default = "default_pool_size")]
    pub pool_size: usize,

    /// Correlation ID range.
    #[serde(rename = "id_pool_range", default)]
    pub id_range: IdRange,

    /// Stage deadlines.
    #[serde(default)]
    pub timeouts: Timeouts,

    /// TLS upgrade settings.
    #[serde(default)]
    pub tls: TlsSettings,
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            id_range: IdRange::default(),
            timeouts: Timeouts::default(),
            tls: TlsSettings::default(),
        }
    }
}

// ============================================================================
// PooledTcpConfig
// ============================================================================

/// Complete configuration of a pooled (or single-session) TCP connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PooledTcpConfig {
    /// Pool and timeout settings.
    #[serde(default)]
    pub settings: PoolSettings,

    /// Command and resource-lock tables.
    #[serde(default)]
    pub mappings: Mappings,

    /// Macro table.
    #[serde(default)]
    pub actions: ActionMap,
}

impl PooledTcpConfig {
    /// Creates a configuration with the given pool size and ID range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the ID range is inverted or too long.
    pub fn new(pool_size: usize, lo: u32, hi: u32) -> Result<Self> {
        let mut config = Self::default();
        config.settings.pool_size = pool_size;
        config.settings.id_range = IdRange::new(lo, hi)?;
        Ok(config)
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

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the document does not parse
    /// - [`Error::Config`] if validation fails
    pub fn from_json_str(json: &str) -> Result<Self> {
        super::parse_json(json, Self::validate)
    }

    /// Checks semantic constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero pool size or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.settings.pool_size == 0 {
            return Err(Error::config("connection_pool_size must be at least 1"));
        }
        self.settings.timeouts.validate()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl PooledTcpConfig {
    /// Replaces the timeout set.
    #[inline]
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.settings.timeouts = timeouts;
        self
    }

    /// Replaces the TLS settings.
    #[inline]
    #[must_use]
    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.settings.tls = tls;
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

    /// Serializes `command` on `resource`.
    #[must_use]
    pub fn with_resource_lock(
        mut self,
        command: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        self.mappings.resource_locks.insert(command, resource);
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

    const SAMPLE: &str = r#"
settings:
  connection_pool_size: 2
  id_pool_range: [1, 2]
  timeouts:
    connection: 1.5
    get_command: 2.0
    set_command: 10.0
    pool_get: 0.25
mappings:
  commands:
    telescope:
      rightascension: MOUNT.RA
      declination: MOUNT.DEC
  resource_locks:
    MOUNT.RA: mount_axes
    MOUNT.DEC: mount_axes
actions:
  slew:
    - { component: telescope, variable: rightascension, value: "{ra}" }
    - { component: telescope, variable: declination, value: "{dec}" }
"#;

    #[test]
    fn test_parse_sample_document() {
        let config = PooledTcpConfig::from_yaml_str(SAMPLE).expect("parse");

        assert_eq!(config.settings.pool_size, 2);
        assert_eq!(config.settings.id_range.len(), 2);
        assert_eq!(config.settings.timeouts.connection, Duration::from_millis(1500));
        assert_eq!(config.settings.timeouts.pool_get, Duration::from_millis(250));
        assert!(config.settings.timeouts.resource_lock.is_none());
        assert_eq!(config.mappings.commands.len(), 2);
        assert_eq!(config.actions.get("slew").map(<[_]>::len), Some(2));
        assert!(config.settings.tls.system_roots);
    }

    #[test]
    fn test_full_u32_id_range_rejected() {
        assert!(PooledTcpConfig::new(1, 0, u32::MAX).is_err());
        let yaml = "settings: { id_pool_range: [0, 4294967295] }";
        assert!(PooledTcpConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = PooledTcpConfig::from_yaml_str("settings: {}").expect("parse");
        assert_eq!(config.settings.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.settings.timeouts, Timeouts::default());
        assert!(config.mappings.commands.is_empty());
    }

    #[test]
    fn test_zero_pool_rejected() {
        let err = PooledTcpConfig::from_yaml_str("settings: { connection_pool_size: 0 }")
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = PooledTcpConfig::from_yaml_str("settings: { timeouts: { pool_get: 0 } }")
            .unwrap_err();
        assert!(err.to_string().contains("pool_get"));
    }

    #[test]
    fn test_negative_timeout_rejected() {
        assert!(PooledTcpConfig::from_yaml_str("settings: { timeouts: { get: -1 } }").is_err());
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(PooledTcpConfig::from_yaml_str("settings: { id_pool_range: [5, 1] }").is_err());
    }

    #[test]
    fn test_json_document() {
        let json = r#"{"settings": {"connection_pool_size": 3, "id_pool_range": [10, 20],
                      "timeouts": {"get": 1.0, "set": 2.0}}}"#;
        let config = PooledTcpConfig::from_json_str(json).expect("parse");
        assert_eq!(config.settings.pool_size, 3);
        assert_eq!(config.settings.timeouts.get, Duration::from_secs(1));
        assert_eq!(config.settings.timeouts.set, Duration::from_secs(2));
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        std::io::Write::write_all(&mut file, SAMPLE.as_bytes()).expect("write");

        let config = PooledTcpConfig::from_yaml_file(file.path()).expect("load");
        assert_eq!(config.settings.pool_size, 2);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = PooledTcpConfig::from_yaml_file("/nonexistent/pilar.yaml").unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_builder_methods() {
        let config = PooledTcpConfig::new(2, 1, 2)
            .expect("config")
            .with_timeouts(Timeouts::uniform(Duration::from_secs(1)))
            .with_command("telescope", "rightascension", CommandDefinition::new("MOUNT.RA"))
            .with_resource_lock("MOUNT.RA", "mount_axes")
            .with_action(
                "slew",
                vec![ActionStep::new("telescope", "rightascension", "{ra}")],
            );

        assert!(config.validate().is_ok());
        assert_eq!(
            config.mappings.resource_locks.resource_for("MOUNT.RA"),
            Some("mount_axes")
        );
    }
}
