//! UDP datagram connector (`udp`).
//!
//! Commands go out as fixed-size zero-padded datagrams to one peer; replies
//! carry a `**** OKAY` marker on success. A socket that fails with anything
//! other than a timeout or an explicit rejection is dropped and the
//! connector reports itself disconnected.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::component::{Arguments, Component};
use crate::config::DatagramConfig;
use crate::error::{Error, Result};
use crate::protocol::{CommandStatus, WireCommand};
use crate::transport::DatagramConnection;

use super::dispatch::{Dispatcher, Exchange};
use super::{ConnectionState, Connector, Endpoint, StateCell, SubscriptionCallback};

// ============================================================================
// DatagramConnector
// ============================================================================

/// Connector over one connected UDP socket.
#[derive(Debug)]
pub struct DatagramConnector {
    config: DatagramConfig,
    dispatcher: Dispatcher,
    state: StateCell,
    socket: RwLock<Option<Arc<DatagramConnection>>>,
    lifecycle: AsyncMutex<()>,
}

impl DatagramConnector {
    /// Registered protocol name.
    pub const PROTOCOL: &'static str = "udp";

    /// Creates a disconnected connector.
    #[must_use]
    pub fn new(config: DatagramConfig) -> Self {
        let dispatcher = Dispatcher::new(
            Self::PROTOCOL,
            config.mappings.commands.clone(),
            config.actions.clone(),
        );
        Self {
            config,
            dispatcher,
            state: StateCell::default(),
            socket: RwLock::new(None),
            lifecycle: AsyncMutex::new(()),
        }
    }

    /// Configuration in use.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &DatagramConfig {
        &self.config
    }

    fn current_socket(&self) -> Result<Arc<DatagramConnection>> {
        self.socket.read().clone().ok_or(Error::NotConnected)
    }

    /// Sends `command` and returns the reply with the marker stripped.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] before `connect()`
    /// - [`Error::InvalidArgument`] if the command does not fit a packet
    /// - [`Error::Timeout`] if no reply arrived within the command timeout
    /// - [`Error::CommandFailed`] if the peer rejected the command
    /// - any other error after the connector disconnected itself
    pub async fn execute_command(&self, command: &str) -> Result<String> {
        let socket = self.current_socket()?;
        let result = socket
            .execute(command, self.config.settings.command_timeout)
            .await;

        if let Err(e) = &result
            && !matches!(
                e,
                Error::Timeout { .. } | Error::CommandFailed { .. } | Error::InvalidArgument { .. }
            )
        {
            warn!(peer = %socket.peer(), command, error = %e, "Datagram exchange failed; disconnecting");
            self.drop_socket(&socket);
        }
        result
    }

    /// Forgets `socket` if it is still the current one.
    fn drop_socket(&self, socket: &Arc<DatagramConnection>) {
        let mut slot = self.socket.write();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, socket)) {
            *slot = None;
            self.state.set(ConnectionState::Disconnected);
        }
    }
}

#[async_trait]
impl Exchange for DatagramConnector {
    async fn exchange(&self, command: &WireCommand) -> Result<String> {
        self.execute_command(command.text()).await
    }
}

// ============================================================================
// Connector
// ============================================================================

#[async_trait]
impl Connector for DatagramConnector {
    fn protocol(&self) -> &'static str {
        Self::PROTOCOL
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.socket.read().is_some() {
            debug!(endpoint = %endpoint, "Already connected");
            return Ok(());
        }

        self.config.validate()?;
        let connecting = self.state.begin_connect();
        let socket = DatagramConnection::connect(
            &endpoint.host,
            endpoint.port,
            self.config.settings.packet_size,
        )
        .await
        .map_err(|e| Error::connection(format!("UDP socket to {endpoint}: {e}")))?;

        *self.socket.write() = Some(Arc::new(socket));
        connecting.connected();
        info!(
            protocol = Self::PROTOCOL,
            endpoint = %endpoint,
            packet_size = self.config.settings.packet_size,
            "Connected"
        );
        Ok(())
    }

    async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.state.set(ConnectionState::Disconnected);
        if self.socket.write().take().is_some() {
            info!(protocol = Self::PROTOCOL, "Disconnected");
        }
    }

    async fn get(
        &self,
        component: &Component,
        variable: &str,
        kind: Option<&str>,
        _args: &Arguments,
    ) -> Result<Option<Value>> {
        self.current_socket()?;
        self.dispatcher.get(self, component, variable, kind).await
    }

    async fn put(
        &self,
        component: &Component,
        variable: &str,
        _kind: Option<&str>,
        args: &Arguments,
    ) -> Result<CommandStatus> {
        self.current_socket()?;
        self.dispatcher.put(self, component, variable, args).await
    }

    async fn call(
        &self,
        component: &Component,
        function: &str,
        args: &Arguments,
    ) -> Result<CommandStatus> {
        self.current_socket()?;
        self.dispatcher.call(self, component, function, args).await
    }

    async fn subscribe(
        &self,
        variables: &[(String, String)],
        _callback: SubscriptionCallback,
    ) -> Result<()> {
        warn!(
            protocol = Self::PROTOCOL,
            count = variables.len(),
            "Subscriptions are not supported; ignoring"
        );
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
