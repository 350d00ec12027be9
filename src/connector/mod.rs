//! Protocol connectors.
//!
//! A [`Connector`] turns the semantic verbs `get`, `put`, `call` and
//! `subscribe` into command exchanges with one instrument family.
//!
//! # Variants
//!
//! | Protocol | Type | Transport |
//! |----------|------|-----------|
//! | `pilar` | [`PooledTcpConnector`] | Pooled TCP sessions, optional TLS |
//! | `session` | [`SessionConnector`] | One TCP session |
//! | `udp` | [`DatagramConnector`] | Fixed-size UDP datagrams |
//! | `dummy` | [`MockConnector`] | In-memory mount |
//!
//! # Failure Policy
//!
//! `get` returns `Ok(None)` and `put`/`call` return a failed
//! [`CommandStatus`] for configuration errors, peer failures and timeouts;
//! every such failure is logged with its target. Only [`Error::NotConnected`]
//! reaches the caller as an error.

// ============================================================================
// Submodules
// ============================================================================

/// Action expansion.
pub mod action;

/// UDP datagram connector.
pub mod datagram;

/// Command building shared by the wire connectors.
pub(crate) mod dispatch;

/// Pooled command execution.
pub mod executor;

/// Name to constructor registry.
pub mod factory;

/// Per-resource mutual exclusion.
pub mod locks;

/// In-memory mount.
pub mod mock;

/// Pooled TCP connector.
pub mod pooled;

/// Single-session TCP connector.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::{ActionExpander, ActionPlan, ResolvedStep};
pub use datagram::DatagramConnector;
pub use executor::PooledSession;
pub use factory::{ConnectorConstructor, ConnectorFactory};
pub use locks::ResourceLocks;
pub use mock::MockConnector;
pub use pooled::PooledTcpConnector;
pub use session::SessionConnector;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::component::{Arguments, Component};
use crate::error::{Error, Result};
use crate::protocol::CommandStatus;

// ============================================================================
// Types
// ============================================================================

/// Value-change callback: `(component, variable, value)`.
pub type SubscriptionCallback = Arc<dyn Fn(&str, &str, &Value) + Send + Sync>;

// ============================================================================
// Endpoint
// ============================================================================

/// Network address of an instrument controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,
    /// Port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    #[inline]
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::invalid_argument(format!("Endpoint needs host:port: {s}")))?;
        let port = port
            .parse()
            .map_err(|e| Error::invalid_argument(format!("Bad port in {s}: {e}")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(Error::invalid_argument(format!("Endpoint has no host: {s}")));
        }
        Ok(Self::new(host, port))
    }
}

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a connector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport resources held.
    #[default]
    Disconnected,
    /// `connect()` in progress.
    Connecting,
    /// Every transport resource is up.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// Shared state cell for connector implementations.
#[derive(Debug, Default)]
pub(crate) struct StateCell(Mutex<ConnectionState>);

impl StateCell {
    pub(crate) fn get(&self) -> ConnectionState {
        *self.0.lock()
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        *self.0.lock() = state;
    }

    /// Marks `Connecting`; the guard falls back to `Disconnected` unless
    /// [`ConnectingGuard::connected`] is called.
    pub(crate) fn begin_connect(&self) -> ConnectingGuard<'_> {
        self.set(ConnectionState::Connecting);
        ConnectingGuard {
            cell: self,
            done: false,
        }
    }
}

/// Resets a cancelled or failed connect.
pub(crate) struct ConnectingGuard<'a> {
    cell: &'a StateCell,
    done: bool,
}

impl ConnectingGuard<'_> {
    pub(crate) fn connected(mut self) {
        self.done = true;
        self.cell.set(ConnectionState::Connected);
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.cell.set(ConnectionState::Disconnected);
        }
    }
}

// ============================================================================
// Connector Trait
// ============================================================================

/// Uniform capability over one instrument protocol.
///
/// # Example
///
/// ```ignore
/// let connector = factory.create("pilar")?;
/// connector.connect(&"10.0.0.5:65432".parse()?).await?;
///
/// let mount = Component::telescope("mount");
/// let ra = connector.get(&mount, "rightascension", None, &Arguments::new()).await?;
/// let status = connector
///     .call(&mount, "slew", &Arguments::new().with("ra", 12.5).with("dec", -30.0))
///     .await?;
/// ```
#[async_trait]
pub trait Connector: Send + Sync {
    /// Registered protocol name.
    fn protocol(&self) -> &'static str;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Returns `true` when connected.
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Acquires every transport resource; no-op when already connected.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the connector's configuration is invalid
    /// - a connection-kind error if any resource cannot be created
    async fn connect(&self, endpoint: &Endpoint) -> Result<()>;

    /// Releases every transport resource; no-op when disconnected.
    async fn disconnect(&self);

    /// Reads `variable` of `component`.
    ///
    /// `kind` is the caller's requested value kind; wire protocols reply
    /// with text and only log it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] before `connect()` succeeded.
    async fn get(
        &self,
        component: &Component,
        variable: &str,
        kind: Option<&str>,
        args: &Arguments,
    ) -> Result<Option<Value>>;

    /// Writes `variable` of `component`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] before `connect()` succeeded.
    async fn put(
        &self,
        component: &Component,
        variable: &str,
        kind: Option<&str>,
        args: &Arguments,
    ) -> Result<CommandStatus>;

    /// Runs the named action.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] before `connect()` succeeded.
    async fn call(
        &self,
        component: &Component,
        function: &str,
        args: &Arguments,
    ) -> Result<CommandStatus>;

    /// Registers interest in `(component, variable)` changes.
    ///
    /// Variants without push support log a warning and succeed.
    ///
    /// # Errors
    ///
    /// Reserved for variants with push support.
    async fn subscribe(
        &self,
        variables: &[(String, String)],
        callback: SubscriptionCallback,
    ) -> Result<()>;
}

// ============================================================================
// Tests
// ============================================================================
