//! Protocol name to connector constructor registry.
//!
//! # Example
//!
//! ```ignore
//! let factory = ConnectorFactory::new(ProtocolConfig::from_yaml_file("protocols.yaml")?);
//! let connector = factory.create("pilar")?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::ProtocolConfig;
use crate::error::{Error, Result};

use super::{Connector, DatagramConnector, MockConnector, PooledTcpConnector, SessionConnector};

// ============================================================================
// Types
// ============================================================================

/// Builds a connector from the shared configuration.
pub type ConnectorConstructor =
    Box<dyn Fn(&ProtocolConfig) -> Result<Arc<dyn Connector>> + Send + Sync>;

// ============================================================================
// ConnectorFactory
// ============================================================================

/// Registry of connector constructors.
pub struct ConnectorFactory {
    config: ProtocolConfig,
    constructors: FxHashMap<String, ConnectorConstructor>,
}

impl ConnectorFactory {
    /// Creates a factory with the built-in protocols registered.
    ///
    /// | Name | Connector | Section |
    /// |------|-----------|---------|
    /// | `pilar` | [`PooledTcpConnector`] | `pilar` |
    /// | `session` | [`SessionConnector`] | `session` |
    /// | `udp` | [`DatagramConnector`] | `udp` |
    /// | `dummy` | [`MockConnector`] | none |
    #[must_use]
    pub fn new(config: ProtocolConfig) -> Self {
        let mut factory = Self::empty(config);

        factory.register(PooledTcpConnector::PROTOCOL, |config| {
            let section = config
                .pilar
                .clone()
                .ok_or_else(|| missing_section(PooledTcpConnector::PROTOCOL))?;
            section.validate()?;
            Ok(Arc::new(PooledTcpConnector::new(section)))
        });
        factory.register(SessionConnector::PROTOCOL, |config| {
            let section = config
                .session
                .clone()
                .ok_or_else(|| missing_section(SessionConnector::PROTOCOL))?;
            section.validate()?;
            Ok(Arc::new(SessionConnector::new(section)))
        });
        factory.register(DatagramConnector::PROTOCOL, |config| {
            let section = config
                .udp
                .clone()
                .ok_or_else(|| missing_section(DatagramConnector::PROTOCOL))?;
            section.validate()?;
            Ok(Arc::new(DatagramConnector::new(section)))
        });
        factory.register(MockConnector::PROTOCOL, |_| Ok(Arc::new(MockConnector::new())));

        factory
    }

    /// Creates a factory with nothing registered.
    #[must_use]
    pub fn empty(config: ProtocolConfig) -> Self {
        Self {
            config,
            constructors: FxHashMap::default(),
        }
    }

    /// Registers or replaces a constructor.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&ProtocolConfig) -> Result<Arc<dyn Connector>> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(protocol = %name, "Connector registered");
        self.constructors.insert(name, Box::new(constructor));
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn protocols(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Builds a disconnected connector for `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownProtocol`] if nothing is registered under `name`
    /// - [`Error::Config`] if the protocol's configuration section is missing
    ///   or invalid
    pub fn create(&self, name: &str) -> Result<Arc<dyn Connector>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| Error::unknown_protocol(name, self.protocols()))?;
        constructor(&self.config)
    }
}

impl std::fmt::Debug for ConnectorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorFactory")
            .field("protocols", &self.protocols())
            .finish_non_exhaustive()
    }
}

fn missing_section(protocol: &str) -> Error {
    Error::config(format!("No '{protocol}' section in protocol configuration"))
}

// ============================================================================
// Tests
// ============================================================================
