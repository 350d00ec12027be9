//! Observatory instrument protocol connectors.
//!
//! This library lets a control layer talk to heterogeneous instrument
//! controllers (mounts, domes, cameras) through one async [`Connector`]
//! capability: `get`, `put`, `call` and `subscribe`.
//!
//! # Architecture
//!
//! ```text
//!  caller ──► Connector ──► Dispatcher ──► command map / action expander
//!                │
//!                ├─ PooledTcpConnector ──► PooledSession ──► Pool<LineConnection>
//!                │                              └──────────► Pool<CorrelationId>
//!                ├─ SessionConnector ───► LineConnection
//!                ├─ DatagramConnector ──► DatagramConnection (UDP)
//!                └─ MockConnector ─────► in-memory mount
//! ```
//!
//! Key design principles:
//!
//! - Each connector owns its pools and locks; nothing is process-global
//! - Every wait (pool checkout, lock, reply) carries a deadline
//! - Pooled items return through drop guards on every exit path
//! - `get`/`put`/`call` never fail on peer or mapping errors; they log and
//!   return `None` or a failed [`CommandStatus`]
//!
//! # Quick Start
//!
//! ```no_run
//! use obsrv_protocols::{
//!     Arguments, Component, Connector, ConnectorFactory, ProtocolConfig, Result,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ProtocolConfig::from_yaml_file("protocols.yaml")?;
//!     let factory = ConnectorFactory::new(config);
//!
//!     let mount = factory.create("pilar")?;
//!     mount.connect(&"10.0.0.5:65432".parse()?).await?;
//!
//!     let telescope = Component::telescope("mount");
//!     let ra = mount
//!         .get(&telescope, "rightascension", None, &Arguments::new())
//!         .await?;
//!     println!("RA: {ra:?}");
//!
//!     let status = mount
//!         .call(
//!             &telescope,
//!             "slew",
//!             &Arguments::new().with("ra", 12.5).with("dec", -30.0),
//!         )
//!         .await?;
//!     println!("{}", serde_json::to_string(&status)?);
//!
//!     mount.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`component`] | Targets and arguments of connector operations |
//! | [`config`] | YAML/JSON configuration |
//! | [`connector`] | [`Connector`] trait, variants and factory |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Correlation IDs |
//! | [`protocol`] | Wire formats (internal) |
//! | [`transport`] | Sessions, sockets and pools (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Operation targets and arguments.
pub mod component;

/// Connector configuration.
///
/// Load with [`ProtocolConfig::from_yaml_file`] or build programmatically.
pub mod config;

/// Protocol connectors.
///
/// Use [`ConnectorFactory`] to create connectors by protocol name.
pub mod connector;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Correlation identifiers.
pub mod identifiers;

/// Wire formats.
///
/// Internal module defining request framing and reply parsing.
pub mod protocol;

/// Transport layer.
///
/// Internal module handling sessions, sockets and pools.
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

// ============================================================================
// Re-exports
// ============================================================================

// Component types
pub use component::{Arguments, Component, kinds};

// Configuration types
pub use config::{
    ActionMap, ActionStep, CommandDefinition, CommandMap, DatagramConfig, Mappings,
    PoolSettings, PooledTcpConfig, ProtocolConfig, ResourceLockMap, Timeouts, TlsSettings,
};

// Connector types
pub use connector::{
    ConnectionState, Connector, ConnectorFactory, DatagramConnector, Endpoint, MockConnector,
    PooledTcpConnector, SessionConnector, SubscriptionCallback,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CorrelationId, IdRange};

// Status types
pub use protocol::{CommandStatus, StatusKind};
