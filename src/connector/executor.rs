//! Pooled command execution.
//!
//! A [`PooledSession`] owns every transport resource of one connected
//! pooled TCP connector: the open sessions and the correlation IDs.
//!
//! # Execution
//!
//! ```text
//! execute_command_safely
//!   └─ resource lock (if the command is mapped)
//!        └─ execute_on_pooled_connection
//!             ├─ acquire ID          (pool_get timeout)
//!             ├─ acquire connection  (pool_get timeout)
//!             └─ "<id> <command>\n" → value / COMPLETE / FAILED
//! ```
//!
//! IDs and connections go back to their pools when the guards drop. A
//! connection that failed at the transport level, or whose reply never came,
//! is discarded instead and a replacement is opened in the background.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{PoolSettings, Timeouts};
use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::protocol::{Verb, WireCommand};
use crate::transport::{LineConnection, Negotiator, Pool};

use super::locks::ResourceLocks;

// ============================================================================
// Constants
// ============================================================================

/// Pause between attempts to replace a broken connection.
const REPLACE_RETRY_DELAY: Duration = Duration::from_millis(500);

// ============================================================================
// PooledSession
// ============================================================================

/// Connection and ID pools of one connected endpoint.
pub struct PooledSession {
    /// Instance tag for logs.
    id: Uuid,
    /// Opens replacement connections.
    negotiator: Negotiator,
    /// Idle connections.
    connections: Pool<LineConnection>,
    /// Idle correlation IDs.
    ids: Pool<CorrelationId>,
    /// Stage deadlines.
    timeouts: Timeouts,
    /// Configured number of connections.
    pool_size: usize,
}

impl PooledSession {
    /// Opens `pool_size` sessions concurrently and fills the ID pool.
    ///
    /// Either every slot is filled or nothing is kept: on any failure the
    /// sessions already opened are closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] naming how many sessions opened and the
    /// first failure.
    pub async fn open(negotiator: Negotiator, settings: &PoolSettings) -> Result<Arc<Self>> {
        let endpoint = negotiator.endpoint();
        let total = settings.pool_size;

        let results = join_all((0..total).map(|_| negotiator.open())).await;

        let mut opened = Vec::with_capacity(total);
        let mut first_error = None;
        for result in results {
            match result {
                Ok(connection) => opened.push(connection),
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Session failed to open");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            let count = opened.len();
            join_all(opened.into_iter().map(LineConnection::close)).await;
            return Err(Error::connection(format!(
                "{count}/{total} sessions opened to {endpoint}: {e}"
            )));
        }

        let session = Self {
            id: Uuid::new_v4(),
            negotiator,
            connections: Pool::new("connection", opened),
            ids: Pool::new("correlation id", settings.id_range.iter()),
            timeouts: settings.timeouts,
            pool_size: total,
        };
        info!(
            session = %session.id,
            endpoint = %endpoint,
            connections = total,
            ids = settings.id_range.len(),
            "Pooled session opened"
        );

        Ok(Arc::new(session))
    }

    /// Instance tag.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Configured number of connections.
    #[inline]
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Idle connections.
    #[inline]
    #[must_use]
    pub fn available_connections(&self) -> usize {
        self.connections.available()
    }

    /// Idle correlation IDs.
    #[inline]
    #[must_use]
    pub fn available_ids(&self) -> usize {
        self.ids.available()
    }

    /// Response deadline for `verb`.
    #[inline]
    #[must_use]
    pub fn response_timeout(&self, verb: Verb) -> Duration {
        match verb {
            Verb::Get => self.timeouts.get,
            Verb::Set => self.timeouts.set,
        }
    }

    /// Runs one exchange on a pooled connection.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolTimeout`] if no ID or connection freed up in time
    /// - [`Error::NotConnected`] if the session was closed
    /// - [`Error::RequestTimeout`] if the reply did not arrive within `wait`
    /// - [`Error::CommandFailed`] if the peer reported failure
    /// - transport errors from the connection
    pub async fn execute_on_pooled_connection(
        self: &Arc<Self>,
        command: &str,
        wait: Duration,
    ) -> Result<String> {
        let id = self.ids.acquire(self.timeouts.pool_get).await?;
        let mut connection = self.connections.acquire(self.timeouts.pool_get).await?;

        let correlation = *id;
        let result = connection.execute(correlation, command, wait).await;

        if let Err(e) = &result
            && (e.is_transport_fault() || matches!(e, Error::RequestTimeout { .. }))
        {
            warn!(
                session = %self.id,
                peer = connection.peer(),
                id = %correlation,
                error = %e,
                "Discarding connection"
            );
            connection.discard();
            self.replace();
        }

        result
    }

    /// Runs `command` while holding its resource lock, if it has one.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if the resource lock wait elapses, otherwise as
    /// [`PooledSession::execute_on_pooled_connection`].
    pub async fn execute_command_safely(
        self: &Arc<Self>,
        locks: &ResourceLocks,
        command: &WireCommand,
        wait: Duration,
    ) -> Result<String> {
        let _resource = locks.acquire(command.name()).await?;
        self.execute_on_pooled_connection(command.text(), wait).await
    }

    /// Opens one connection in the background to refill the pool.
    ///
    /// Retries until it succeeds or the session is closed.
    fn replace(self: &Arc<Self>) {
        let session = Arc::downgrade(self);
        let negotiator = self.negotiator.clone();

        tokio::spawn(async move {
            loop {
                if session.upgrade().is_none_or(|s| s.connections.is_drained()) {
                    return;
                }
                match negotiator.open().await {
                    Ok(connection) => {
                        if let Some(s) = session.upgrade() {
                            debug!(session = %s.id, "Replacement connection pooled");
                            s.connections.put(connection);
                        }
                        return;
                    }
                    Err(e) => {
                        warn!(endpoint = %negotiator.endpoint(), error = %e, "Replacement failed");
                        tokio::time::sleep(REPLACE_RETRY_DELAY).await;
                    }
                }
            }
        });
    }

    /// Drains both pools and closes the idle connections.
    ///
    /// Checked-out connections are dropped when their commands finish.
    pub async fn close(&self) {
        let idle = self.connections.drain();
        self.ids.drain();

        let closed = idle.len();
        join_all(idle.into_iter().map(LineConnection::close)).await;
        info!(
            session = %self.id,
            closed,
            busy = self.pool_size.saturating_sub(closed),
            "Pooled session closed"
        );
    }
}

impl std::fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("id", &self.id)
            .field("endpoint", &self.negotiator.endpoint())
            .field("connections", &self.connections)
            .field("ids", &self.ids)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashSet;

    use crate::config::{CommandDefinition, ResourceLockMap, TlsSettings};
    use crate::identifiers::IdRange;
    use crate::test_support::{MockPeer, Script, TLS_GREETING, echo_responder, wait_until};

    const WAIT: Duration = Duration::from_secs(1);

    fn settings(pool_size: usize, lo: u32, hi: u32, pool_get: Duration) -> PoolSettings {
        PoolSettings {
            pool_size,
            id_range: IdRange::new(lo, hi).expect("range"),
            timeouts: Timeouts {
                pool_get,
                ..Timeouts::uniform(WAIT)
            },
            tls: TlsSettings::default(),
        }
    }

    fn negotiator(peer: &MockPeer, timeouts: &Timeouts) -> Negotiator {
        let endpoint = peer.endpoint();
        Negotiator::new(endpoint.host, endpoint.port, timeouts, &TlsSettings::default())
    }

    async fn open(peer: &MockPeer, settings: &PoolSettings) -> Arc<PooledSession> {
        PooledSession::open(negotiator(peer, &settings.timeouts), settings)
            .await
            .expect("open")
    }

    #[tokio::test]
    async fn test_open_fills_both_pools() {
        let peer = MockPeer::spawn(echo_responder("1")).await;
        let session = open(&peer, &settings(3, 1, 8, WAIT)).await;

        assert_eq!(peer.accepted(), 3);
        assert_eq!(session.available_connections(), 3);
        assert_eq!(session.available_ids(), 8);
        assert_eq!(session.pool_size(), 3);
    }

    #[tokio::test]
    async fn test_get_round_trip_releases_slots() {
        let peer = MockPeer::spawn(echo_responder("12.5000")).await;
        let session = open(&peer, &settings(2, 1, 2, WAIT)).await;

        let value = session
            .execute_on_pooled_connection("GET MOUNT.RA", WAIT)
            .await
            .expect("execute");

        assert_eq!(value, "12.5000");
        assert_eq!(peer.requests(), [(1, "GET MOUNT.RA".to_string())]);
        assert_eq!(session.available_connections(), 2);
        assert_eq!(session.available_ids(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_ids_are_unique() {
        let peer = MockPeer::spawn(|id, _| Script::complete(id).after(Duration::from_millis(30)))
            .await;
        let session = open(&peer, &settings(4, 1, 8, WAIT)).await;

        let tasks: Vec<_> = (0..4)
            .map(|n| {
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    session
                        .execute_on_pooled_connection(&format!("GET VAR{n}"), WAIT)
                        .await
                })
            })
            .collect();
        for task in join_all(tasks).await {
            assert_eq!(task.expect("join").expect("execute"), "OK");
        }

        let ids: FxHashSet<u32> = peer.requests().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(session.available_ids(), 8);
    }

    #[tokio::test]
    async fn test_extra_command_waits_for_connection() {
        let peer = MockPeer::spawn(|id, _| Script::complete(id).after(Duration::from_millis(100)))
            .await;
        let session = open(&peer, &settings(2, 1, 8, WAIT)).await;

        let started = tokio::time::Instant::now();
        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    session.execute_on_pooled_connection("GET MOUNT.RA", WAIT).await
                })
            })
            .collect();
        for task in join_all(tasks).await {
            assert!(task.expect("join").is_ok());
        }

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(session.available_connections(), 2);
    }

    #[tokio::test]
    async fn test_extra_command_times_out_past_pool_get() {
        let peer = MockPeer::spawn(|id, _| Script::complete(id).after(Duration::from_millis(300)))
            .await;
        let session = open(&peer, &settings(1, 1, 8, Duration::from_millis(50))).await;

        let busy = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.execute_on_pooled_connection("GET A", WAIT).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = session
            .execute_on_pooled_connection("GET B", WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PoolTimeout { ref resource, .. } if resource == "connection"));

        assert!(busy.await.expect("join").is_ok());
        assert_eq!(session.available_connections(), 1);
        assert_eq!(session.available_ids(), 8);
    }

    #[tokio::test]
    async fn test_command_failure_keeps_connection() {
        let peer = MockPeer::spawn(|id, _| Script::failed(id)).await;
        let session = open(&peer, &settings(1, 1, 2, WAIT)).await;

        let err = session
            .execute_on_pooled_connection("SET MOUNT.RA=99", WAIT)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CommandFailed { .. }));
        assert_eq!(session.available_connections(), 1);
        assert_eq!(session.available_ids(), 2);
        assert_eq!(peer.accepted(), 1);
    }

    #[tokio::test]
    async fn test_timeout_replaces_connection() {
        let peer = MockPeer::spawn(|_, _| Script::silent()).await;
        let session = open(&peer, &settings(1, 1, 2, WAIT)).await;

        let err = session
            .execute_on_pooled_connection("GET MOUNT.RA", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestTimeout { .. }));
        assert_eq!(session.available_ids(), 2);

        assert!(wait_until(|| session.available_connections() == 1).await);
        assert_eq!(peer.accepted(), 2);
    }

    #[tokio::test]
    async fn test_hangup_replaces_connection() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let peer = MockPeer::spawn(move |id, command| {
            if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Script::hangup()
            } else {
                echo_responder("7")(id, command)
            }
        })
        .await;
        let session = open(&peer, &settings(1, 1, 2, WAIT)).await;

        let err = session
            .execute_on_pooled_connection("GET FOCUS.POS", WAIT)
            .await
            .unwrap_err();
        assert!(err.is_transport_fault());

        assert!(wait_until(|| session.available_connections() == 1).await);
        let value = session
            .execute_on_pooled_connection("GET FOCUS.POS", WAIT)
            .await
            .expect("execute");
        assert_eq!(value, "7");
        assert_eq!(peer.accepted(), 2);
    }

    #[tokio::test]
    async fn test_resource_lock_serializes_commands() {
        let peer = MockPeer::spawn(|id, _| Script::complete(id).after(Duration::from_millis(50)))
            .await;
        let session = open(&peer, &settings(2, 1, 8, WAIT)).await;

        let mut map = ResourceLockMap::new();
        map.insert("MOUNT.RA", "mount_axes");
        map.insert("MOUNT.DEC", "mount_axes");
        let locks = Arc::new(ResourceLocks::new(&map, None));

        let commands = [
            WireCommand::set(&CommandDefinition::new("MOUNT.RA"), &12.5.into()),
            WireCommand::set(&CommandDefinition::new("MOUNT.DEC"), &(-30.0).into()),
        ];
        let tasks: Vec<_> = commands
            .into_iter()
            .map(|command| {
                let session = Arc::clone(&session);
                let locks = Arc::clone(&locks);
                tokio::spawn(async move {
                    session.execute_command_safely(&locks, &command, WAIT).await
                })
            })
            .collect();
        for task in join_all(tasks).await {
            assert!(task.expect("join").is_ok());
        }

        assert_eq!(peer.max_in_flight(), 1);
        assert_eq!(peer.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_unlocked_commands_overlap() {
        let peer = MockPeer::spawn(|id, _| Script::complete(id).after(Duration::from_millis(50)))
            .await;
        let session = open(&peer, &settings(2, 1, 8, WAIT)).await;
        let locks = Arc::new(ResourceLocks::default());

        let tasks: Vec<_> = ["MOUNT.RA", "MOUNT.DEC"]
            .into_iter()
            .map(|name| {
                let session = Arc::clone(&session);
                let locks = Arc::clone(&locks);
                let command = WireCommand::set(&CommandDefinition::new(name), &1.into());
                tokio::spawn(async move {
                    session.execute_command_safely(&locks, &command, WAIT).await
                })
            })
            .collect();
        join_all(tasks).await;

        assert_eq!(peer.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_open_fails_without_tls_ack() {
        let peer = MockPeer::spawn_with(TLS_GREETING, Some("ENC NO"), echo_responder("1")).await;
        let settings = settings(2, 1, 2, WAIT);

        let err = PooledSession::open(negotiator(&peer, &settings.timeouts), &settings)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Connection { .. }));
        assert!(err.to_string().contains("0/2"));
    }

    #[tokio::test]
    async fn test_close_drains_pools() {
        let peer = MockPeer::spawn(echo_responder("1")).await;
        let session = open(&peer, &settings(2, 1, 2, WAIT)).await;

        session.close().await;

        assert_eq!(session.available_connections(), 0);
        let err = session
            .execute_on_pooled_connection("GET MOUNT.RA", WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }
}
