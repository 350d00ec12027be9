//! Single-session TCP connector (`session`).
//!
//! Same wire protocol as the pooled connector over exactly one session.
//! Exchanges are serialized by a mutex; correlation IDs still tag every
//! request and cycle through the configured range.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::component::{Arguments, Component};
use crate::config::PooledTcpConfig;
use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::protocol::{CommandStatus, Verb, WireCommand};
use crate::transport::{LineConnection, Negotiator};

use super::dispatch::{Dispatcher, Exchange};
use super::locks::ResourceLocks;
use super::{ConnectionState, Connector, Endpoint, StateCell, SubscriptionCallback};

// ============================================================================
// SessionConnector
// ============================================================================

/// Connector over one line-protocol session.
#[derive(Debug)]
pub struct SessionConnector {
    config: PooledTcpConfig,
    dispatcher: Dispatcher,
    locks: ResourceLocks,
    state: StateCell,
    connection: AsyncMutex<Option<LineConnection>>,
    /// Offset of the next ID within the range.
    next_id: AtomicU64,
}

impl SessionConnector {
    /// Registered protocol name.
    pub const PROTOCOL: &'static str = "session";

    /// Creates a disconnected connector.
    #[must_use]
    pub fn new(config: PooledTcpConfig) -> Self {
        let dispatcher = Dispatcher::new(
            Self::PROTOCOL,
            config.mappings.commands.clone(),
            config.actions.clone(),
        );
        let locks = ResourceLocks::new(
            &config.mappings.resource_locks,
            config.settings.timeouts.resource_lock,
        );
        Self {
            config,
            dispatcher,
            locks,
            state: StateCell::default(),
            connection: AsyncMutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Next correlation ID, wrapping at the top of the range.
    fn next_correlation_id(&self) -> CorrelationId {
        let range = &self.config.settings.id_range;
        let span = range.len() as u64;
        let offset = self.next_id.fetch_add(1, Ordering::Relaxed) % span;
        CorrelationId::new(range.lo() + offset as u32)
    }

    async fn execute(&self, command: &WireCommand) -> Result<String> {
        let _resource = match command.verb() {
            Verb::Set => self.locks.acquire(command.name()).await?,
            Verb::Get => None,
        };
        let timeouts = &self.config.settings.timeouts;
        let wait = match command.verb() {
            Verb::Get => timeouts.get,
            Verb::Set => timeouts.set,
        };

        let mut slot = self.connection.lock().await;
        let connection = slot.as_mut().ok_or(Error::NotConnected)?;
        let id = self.next_correlation_id();

        let result = connection.execute(id, command.text(), wait).await;
        if let Err(e) = &result
            && (e.is_transport_fault() || matches!(e, Error::RequestTimeout { .. }))
        {
            warn!(
                protocol = Self::PROTOCOL,
                id = %id,
                error = %e,
                "Session lost; disconnecting"
            );
            if let Some(connection) = slot.take() {
                connection.close().await;
            }
            self.state.set(ConnectionState::Disconnected);
        }
        result
    }
}

#[async_trait]
impl Exchange for SessionConnector {
    async fn exchange(&self, command: &WireCommand) -> Result<String> {
        self.execute(command).await
    }
}

// ============================================================================
// Connector
// ============================================================================

#[async_trait]
impl Connector for SessionConnector {
    fn protocol(&self) -> &'static str {
        Self::PROTOCOL
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<()> {
        let mut slot = self.connection.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        self.config.validate()?;
        let connecting = self.state.begin_connect();
        let settings = &self.config.settings;
        let negotiator = Negotiator::new(
            endpoint.host.clone(),
            endpoint.port,
            &settings.timeouts,
            &settings.tls,
        );
        let connection = negotiator
            .open()
            .await
            .map_err(|e| Error::connection(format!("0/1 sessions opened to {endpoint}: {e}")))?;

        *slot = Some(connection);
        connecting.connected();
        info!(protocol = Self::PROTOCOL, endpoint = %endpoint, "Connected");
        Ok(())
    }

    async fn disconnect(&self) {
        let mut slot = self.connection.lock().await;
        self.state.set(ConnectionState::Disconnected);
        if let Some(connection) = slot.take() {
            connection.close().await;
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
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.dispatcher.get(self, component, variable, kind).await
    }

    async fn put(
        &self,
        component: &Component,
        variable: &str,
        _kind: Option<&str>,
        args: &Arguments,
    ) -> Result<CommandStatus> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.dispatcher.put(self, component, variable, args).await
    }

    async fn call(
        &self,
        component: &Component,
        function: &str,
        args: &Arguments,
    ) -> Result<CommandStatus> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
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
