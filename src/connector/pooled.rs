//! Pooled TCP connector (`pilar`).
//!
//! Keeps a fixed set of line-protocol sessions open to one controller and
//! multiplexes commands over them with correlation IDs.
//!
//! # Example
//!
//! ```ignore
//! let connector = PooledTcpConnector::new(PooledTcpConfig::from_yaml_file("pilar.yaml")?);
//! connector.connect(&Endpoint::new("10.0.0.5", 65432)).await?;
//!
//! let mount = Component::telescope("mount");
//! let ra = connector.get(&mount, "rightascension", None, &Arguments::new()).await?;
//! ```

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
use crate::config::PooledTcpConfig;
use crate::error::{Error, Result};
use crate::protocol::{CommandStatus, Verb, WireCommand};
use crate::transport::Negotiator;

use super::dispatch::{Dispatcher, Exchange};
use super::executor::PooledSession;
use super::locks::ResourceLocks;
use super::{ConnectionState, Connector, Endpoint, StateCell, SubscriptionCallback};

// ============================================================================
// PooledTcpConnector
// ============================================================================

/// Connector holding a pool of TCP sessions to one controller.
#[derive(Debug)]
pub struct PooledTcpConnector {
    config: PooledTcpConfig,
    dispatcher: Dispatcher,
    locks: ResourceLocks,
    state: StateCell,
    session: RwLock<Option<Arc<PooledSession>>>,
    /// Serializes connect and disconnect.
    lifecycle: AsyncMutex<()>,
}

impl PooledTcpConnector {
    /// Registered protocol name.
    pub const PROTOCOL: &'static str = "pilar";

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
            session: RwLock::new(None),
            lifecycle: AsyncMutex::new(()),
        }
    }

    /// Configuration in use.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PooledTcpConfig {
        &self.config
    }

    /// Idle pooled connections; zero when disconnected.
    #[must_use]
    pub fn available_connections(&self) -> usize {
        self.session
            .read()
            .as_ref()
            .map_or(0, |s| s.available_connections())
    }

    /// Idle correlation IDs; zero when disconnected.
    #[must_use]
    pub fn available_ids(&self) -> usize {
        self.session.read().as_ref().map_or(0, |s| s.available_ids())
    }

    fn current_session(&self) -> Result<Arc<PooledSession>> {
        self.session.read().clone().ok_or(Error::NotConnected)
    }
}

// ============================================================================
// Exchange
// ============================================================================

/// Pooled exchange: `SET` holds the resource lock, `GET` runs unsynchronized.
struct PooledExchange<'a> {
    session: Arc<PooledSession>,
    locks: &'a ResourceLocks,
}

#[async_trait]
impl Exchange for PooledExchange<'_> {
    async fn exchange(&self, command: &WireCommand) -> Result<String> {
        let wait = self.session.response_timeout(command.verb());
        match command.verb() {
            Verb::Get => {
                self.session
                    .execute_on_pooled_connection(command.text(), wait)
                    .await
            }
            Verb::Set => {
                self.session
                    .execute_command_safely(self.locks, command, wait)
                    .await
            }
        }
    }
}

// ============================================================================
// Connector
// ============================================================================

#[async_trait]
impl Connector for PooledTcpConnector {
    fn protocol(&self) -> &'static str {
        Self::PROTOCOL
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.state.get() == ConnectionState::Connected {
            debug!(endpoint = %endpoint, "Already connected");
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

        let session = PooledSession::open(negotiator, settings).await?;
        *self.session.write() = Some(session);
        connecting.connected();

        info!(
            protocol = Self::PROTOCOL,
            endpoint = %endpoint,
            pool_size = settings.pool_size,
            "Connected"
        );
        Ok(())
    }

    async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(session) = self.session.write().take() else {
            return;
        };
        self.state.set(ConnectionState::Disconnected);

        session.close().await;
        info!(protocol = Self::PROTOCOL, "Disconnected");
    }

    async fn get(
        &self,
        component: &Component,
        variable: &str,
        kind: Option<&str>,
        _args: &Arguments,
    ) -> Result<Option<Value>> {
        let link = PooledExchange {
            session: self.current_session()?,
            locks: &self.locks,
        };
        self.dispatcher.get(&link, component, variable, kind).await
    }

    async fn put(
        &self,
        component: &Component,
        variable: &str,
        _kind: Option<&str>,
        args: &Arguments,
    ) -> Result<CommandStatus> {
        let link = PooledExchange {
            session: self.current_session()?,
            locks: &self.locks,
        };
        self.dispatcher.put(&link, component, variable, args).await
    }

    async fn call(
        &self,
        component: &Component,
        function: &str,
        args: &Arguments,
    ) -> Result<CommandStatus> {
        let link = PooledExchange {
            session: self.current_session()?,
            locks: &self.locks,
        };
        self.dispatcher.call(&link, component, function, args).await
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
