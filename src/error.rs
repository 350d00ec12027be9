//! Error types for the protocol connectors.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use obsrv_protocols::{Component, Connector, Result};
//!
//! async fn read_ra(connector: &dyn Connector) -> Result<()> {
//!     let mount = Component::telescope("mount");
//!     let ra = connector.get(&mount, "rightascension", None, &Default::default()).await?;
//!     println!("RA: {ra:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::UnknownCommand`], [`Error::UnknownAction`], [`Error::MissingArgument`], [`Error::UnknownProtocol`] |
//! | Connection | [`Error::NotConnected`], [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Tls`] |
//! | Timeout | [`Error::PoolTimeout`], [`Error::RequestTimeout`], [`Error::Timeout`] |
//! | Protocol | [`Error::CommandFailed`], [`Error::Protocol`], [`Error::InvalidArgument`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::Yaml`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::CorrelationId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when connector configuration is missing or invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// No command mapping for a component kind and variable.
    #[error("No command mapped for {kind}.{variable}")]
    UnknownCommand {
        /// Component kind that was looked up.
        kind: String,
        /// Variable that was looked up.
        variable: String,
    },

    /// Action name not present in the action map.
    #[error("Unknown action: {action}")]
    UnknownAction {
        /// The unrecognized action name.
        action: String,
    },

    /// Action or command placeholder not supplied by the caller.
    #[error("Missing argument '{argument}' for '{target}'")]
    MissingArgument {
        /// Placeholder name.
        argument: String,
        /// Action or variable that required it.
        target: String,
    },

    /// No connector registered under the requested protocol name.
    #[error("Unknown protocol: {protocol}. Available: {available:?}")]
    UnknownProtocol {
        /// The requested protocol name.
        protocol: String,
        /// Registered protocol names.
        available: Vec<String>,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Operation issued before `connect()` succeeded.
    #[error("Connector not connected")]
    NotConnected,

    /// Transport connection failed.
    ///
    /// Returned when a session cannot be established or negotiated.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout while opening a session.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed unexpectedly by the peer.
    #[error("Connection closed")]
    ConnectionClosed,

    /// TLS handshake or setup failure.
    #[error("TLS error: {message}")]
    Tls {
        /// Description of the TLS failure.
        message: String,
    },

    // ========================================================================
    // Timeout Errors
    // ========================================================================
    /// No pooled item became available in time.
    #[error("No available {resource} in the pool after {timeout_ms}ms")]
    PoolTimeout {
        /// Pool that was exhausted (`connection`, `correlation id`, ...).
        resource: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Command response timeout.
    #[error("Request {id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The correlation ID that timed out.
        id: CorrelationId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Peer explicitly reported command failure.
    #[error("Command failed: {command}")]
    CommandFailed {
        /// Command text that failed.
        command: String,
        /// Peer response, if the protocol carries one.
        response: Option<String>,
    },

    /// Protocol violation or unexpected frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Invalid argument supplied by the caller.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an unknown command error.
    #[inline]
    pub fn unknown_command(kind: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::UnknownCommand {
            kind: kind.into(),
            variable: variable.into(),
        }
    }

    /// Creates an unknown action error.
    #[inline]
    pub fn unknown_action(action: impl Into<String>) -> Self {
        Self::UnknownAction {
            action: action.into(),
        }
    }

    /// Creates a missing argument error.
    #[inline]
    pub fn missing_argument(argument: impl Into<String>, target: impl Into<String>) -> Self {
        Self::MissingArgument {
            argument: argument.into(),
            target: target.into(),
        }
    }

    /// Creates an unknown protocol error.
    #[inline]
    pub fn unknown_protocol(protocol: impl Into<String>, available: Vec<String>) -> Self {
        Self::UnknownProtocol {
            protocol: protocol.into(),
            available,
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a TLS error.
    #[inline]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }

    /// Creates a pool timeout error.
    #[inline]
    pub fn pool_timeout(resource: impl Into<String>, timeout_ms: u64) -> Self {
        Self::PoolTimeout {
            resource: resource.into(),
            timeout_ms,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(id: CorrelationId, timeout_ms: u64) -> Self {
        Self::RequestTimeout { id, timeout_ms }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a command failed error.
    #[inline]
    pub fn command_failed(command: impl Into<String>, response: Option<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            response,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::PoolTimeout { .. }
                | Self::RequestTimeout { .. }
                | Self::Timeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Tls { .. }
        )
    }

    /// Returns `true` if this is a configuration error.
    #[inline]
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::UnknownCommand { .. }
                | Self::UnknownAction { .. }
                | Self::MissingArgument { .. }
                | Self::UnknownProtocol { .. }
                | Self::Yaml(_)
        )
    }

    /// Returns `true` if the peer rejected the command or sent a bad frame.
    #[inline]
    #[must_use]
    pub fn is_protocol_failure(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. } | Self::Protocol { .. } | Self::InvalidArgument { .. }
        )
    }

    /// Returns `true` if the transport under this error can no longer be trusted.
    ///
    /// Pooled connections that fail with such an error are discarded instead
    /// of being returned to the pool.
    #[inline]
    #[must_use]
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::Io(_) | Self::Tls { .. } | Self::Connection { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry. This layer never retries by
    /// itself; the predicate is for callers.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PoolTimeout { .. } | Self::RequestTimeout { .. } | Self::Timeout { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
