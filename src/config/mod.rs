//! Connector configuration.
//!
//! Configuration is loaded once and then shared read-only by every command.
//! Documents follow the `settings / mappings / actions` layout used by the
//! instrument configuration files.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PooledTcpConfig`] | Pooled and single-session TCP connectors |
//! | [`DatagramConfig`] | UDP datagram connector |
//! | [`ProtocolConfig`] | One optional section per protocol, for the factory |
//! | [`CommandMap`] | `{kind: {variable: command}}` |
//! | [`ResourceLockMap`] | `{command: resource}` |
//! | [`ActionMap`] | `{action: [steps]}` |
//!
//! Timeouts are written as seconds (`2.5`) and exposed as [`Duration`].

// ============================================================================
// Submodules
// ============================================================================

/// UDP datagram connector configuration.
pub mod datagram;

/// Command, resource-lock and action tables.
pub mod mapping;

/// Pooled TCP connector configuration.
pub mod pooled;

// ============================================================================
// Re-exports
// ============================================================================

pub use datagram::{DatagramConfig, DatagramSettings};
pub use mapping::{
    ActionMap, ActionStep, CommandDefinition, CommandMap, Mappings, ResourceLockMap,
    placeholder_name,
};
pub use pooled::{PoolSettings, PooledTcpConfig, Timeouts, TlsSettings};

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// ProtocolConfig
// ============================================================================

/// Per-protocol sections handed to the connector factory.
///
/// ```yaml
/// pilar:
///   settings: { connection_pool_size: 4, id_pool_range: [1, 32] }
/// udp:
///   settings: { packet_size: 256 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Pooled TCP connector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pilar: Option<PooledTcpConfig>,

    /// Single-session TCP connector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<PooledTcpConfig>,

    /// UDP datagram connector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp: Option<DatagramConfig>,
}

impl ProtocolConfig {
    /// Parses and validates every present section.
    ///
    /// # Errors
    ///
    /// - [`Error::Yaml`] if the document does not parse
    /// - [`Error::Config`] if a section fails validation
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        parse_yaml(yaml, Self::validate)
    }

    /// Reads, parses and validates a YAML file.
    ///
    /// # Errors
    ///
    /// See [`ProtocolConfig::from_yaml_str`].
    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Result<Self> {
        let yaml = read_config_file(path.into())?;
        Self::from_yaml_str(&yaml)
    }

    /// Validates every present section.
    ///
    /// # Errors
    ///
    /// Returns the first section error.
    pub fn validate(&self) -> Result<()> {
        if let Some(pilar) = &self.pilar {
            pilar.validate()?;
        }
        if let Some(session) = &self.session {
            session.validate()?;
        }
        if let Some(udp) = &self.udp {
            udp.validate()?;
        }
        Ok(())
    }
}

// ============================================================================
// Loading Helpers
// ============================================================================

/// Parses YAML then runs the type's validation.
fn parse_yaml<T: DeserializeOwned>(yaml: &str, validate: impl Fn(&T) -> Result<()>) -> Result<T> {
    let config: T = serde_yaml::from_str(yaml)?;
    validate(&config)?;
    Ok(config)
}

/// Parses JSON then runs the type's validation.
fn parse_json<T: DeserializeOwned>(json: &str, validate: impl Fn(&T) -> Result<()>) -> Result<T> {
    let config: T = serde_json::from_str(json)?;
    validate(&config)?;
    Ok(config)
}

/// Reads a configuration file, reporting a missing file as a config error.
fn read_config_file(path: PathBuf) -> Result<String> {
    debug!(path = %path.display(), "Loading connector configuration");
    std::fs::read_to_string(&path).map_err(|e| {
        Error::config(format!(
            "Could not read configuration file {}: {e}",
            path.display()
        ))
    })
}

/// Rejects zero durations.
fn ensure_positive(field: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(Error::config(format!("{field} must be positive")));
    }
    Ok(())
}

// ============================================================================
// Duration Serde
// ============================================================================

/// `Duration` as fractional seconds.
pub(crate) mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| de::Error::custom(format!("invalid timeout {secs}: {e}")))
    }
}

/// `Option<Duration>` as fractional seconds.
pub(crate) mod seconds_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| de::Error::custom(format!("invalid timeout {secs}: {e}")))
            })
            .transpose()
    }
}

// ============================================================================
// Tests
// ============================================================================
