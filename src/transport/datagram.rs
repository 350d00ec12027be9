//! Connected UDP socket with one outstanding exchange.
//!
//! A background task receives every datagram and completes the armed
//! waiter, if any. The in-flight mutex guarantees at most one waiter, so no
//! correlation ID is needed on the wire.
//!
//! ```text
//! execute ── lock in-flight ── arm oneshot ── send ── await (timeout)
//!                                   ▲
//! recv loop ────────────────────────┘ take waiter, complete
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{UdpSocket, lookup_host};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::datagram;

// ============================================================================
// Constants
// ============================================================================

/// Largest reply accepted.
const MAX_REPLY_LEN: usize = 65_536;

// ============================================================================
// Types
// ============================================================================

/// Completion slot for the single outstanding exchange.
type Waiter = Arc<Mutex<Option<oneshot::Sender<Result<Vec<u8>>>>>>;

// ============================================================================
// DatagramConnection
// ============================================================================

/// UDP socket connected to one peer.
pub struct DatagramConnection {
    /// Shared with the receive task.
    socket: Arc<UdpSocket>,
    /// Remote peer.
    peer: SocketAddr,
    /// Exact request size.
    packet_size: usize,
    /// Armed completion signal.
    waiter: Waiter,
    /// Serializes exchanges.
    in_flight: AsyncMutex<()>,
    /// Set when the receive task exits.
    closed: Arc<AtomicBool>,
    /// Receive task.
    receiver: JoinHandle<()>,
}

impl DatagramConnection {
    /// Binds an ephemeral local port and connects it to `host:port`.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the host does not resolve
    /// - [`Error::Io`] if bind or connect fails
    pub async fn connect(host: &str, port: u16, packet_size: usize) -> Result<Self> {
        let peer = lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| Error::connection(format!("{host}:{port} did not resolve")))?;

        let unspecified = if peer.is_ipv4() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        };
        let local = SocketAddr::new(unspecified, 0);
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;

        Ok(Self::from_socket(socket, peer, packet_size))
    }

    fn from_socket(socket: UdpSocket, peer: SocketAddr, packet_size: usize) -> Self {
        let socket = Arc::new(socket);
        let waiter: Waiter = Arc::new(Mutex::new(None));
        let closed = Arc::new(AtomicBool::new(false));

        let receiver = tokio::spawn(Self::run_receive_loop(
            Arc::clone(&socket),
            Arc::clone(&waiter),
            Arc::clone(&closed),
        ));

        debug!(%peer, packet_size, "Datagram socket connected");

        Self {
            socket,
            peer,
            packet_size,
            waiter,
            in_flight: AsyncMutex::new(()),
            closed,
            receiver,
        }
    }

    /// Remote peer.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Returns `true` once the receive task stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sends `command` and waits for the reply payload.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the command exceeds the packet size; nothing is sent
    /// - [`Error::Timeout`] if no reply arrived within `wait`
    /// - [`Error::CommandFailed`] if the reply lacks the success marker
    /// - [`Error::Protocol`] if the reply is not valid text
    /// - [`Error::ConnectionClosed`] / [`Error::Io`] on socket failure
    pub async fn execute(&self, command: &str, wait: Duration) -> Result<String> {
        let packet = datagram::encode(command, self.packet_size)?;

        let _flight = self.in_flight.lock().await;
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let (tx, rx) = oneshot::channel();
        *self.waiter.lock() = Some(tx);

        trace!(peer = %self.peer, command, "Datagram sent");
        if let Err(e) = self.socket.send(&packet).await {
            self.waiter.lock().take();
            return Err(e.into());
        }

        match timeout(wait, rx).await {
            Ok(Ok(Ok(reply))) => datagram::decode(&reply)?.into_result(command),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.waiter.lock().take();
                Err(Error::timeout(
                    format!("reply to {command}"),
                    wait.as_millis() as u64,
                ))
            }
        }
    }

    /// Background task completing the armed waiter.
    async fn run_receive_loop(socket: Arc<UdpSocket>, waiter: Waiter, closed: Arc<AtomicBool>) {
        let mut buf = vec![0u8; MAX_REPLY_LEN];

        loop {
            match socket.recv(&mut buf).await {
                Ok(n) => {
                    let reply = buf[..n].to_vec();
                    match waiter.lock().take() {
                        Some(tx) => {
                            let _ = tx.send(Ok(reply));
                        }
                        None => warn!(len = n, "Unsolicited datagram dropped"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Datagram receive failed");
                    if let Some(tx) = waiter.lock().take() {
                        let _ = tx.send(Err(e.into()));
                    }
                    break;
                }
            }
        }

        closed.store(true, Ordering::Release);
        debug!("Datagram receive loop terminated");
    }
}

impl Drop for DatagramConnection {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

impl std::fmt::Debug for DatagramConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramConnection")
            .field("peer", &self.peer)
            .field("packet_size", &self.packet_size)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const PACKET: usize = 32;
    const WAIT: Duration = Duration::from_millis(500);

    async fn peer_socket() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
        let port = socket.local_addr().expect("addr").port();
        (socket, port)
    }

    #[tokio::test]
    async fn test_exchange_strips_marker() {
        let (device, port) = peer_socket().await;
        let conn = DatagramConnection::connect("127.0.0.1", port, PACKET)
            .await
            .expect("connect");

        let device_task = tokio::spawn(async move {
            let mut buf = [0u8; 128];
            let (n, from) = device.recv_from(&mut buf).await.expect("recv");
            device
                .send_to(b"**** OKAY -80.0\0\0\0", from)
                .await
                .expect("send");
            buf[..n].to_vec()
        });

        let value = conn.execute("GET CCD.TEMP", WAIT).await.expect("execute");
        let request = device_task.await.expect("join");

        assert_eq!(value, "-80.0");
        assert_eq!(request.len(), PACKET);
        assert!(request.starts_with(b"GET CCD.TEMP\0"));
    }

    #[tokio::test]
    async fn test_rejected_reply_is_command_failure() {
        let (device, port) = peer_socket().await;
        let conn = DatagramConnection::connect("127.0.0.1", port, PACKET)
            .await
            .expect("connect");

        tokio::spawn(async move {
            let mut buf = [0u8; 128];
            let (_, from) = device.recv_from(&mut buf).await.expect("recv");
            device.send_to(b"**** ERROR\0", from).await.expect("send");
        });

        let err = conn.execute("SET CCD.TEMP=-90", WAIT).await.unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_oversize_command_not_sent() {
        let (device, port) = peer_socket().await;
        let conn = DatagramConnection::connect("127.0.0.1", port, 12)
            .await
            .expect("connect");

        let err = conn
            .execute("GET A.VERY.LONG.VARIABLE", WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));

        let mut buf = [0u8; 64];
        let nothing = timeout(Duration::from_millis(50), device.recv_from(&mut buf)).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let (_device, port) = peer_socket().await;
        let conn = DatagramConnection::connect("127.0.0.1", port, PACKET)
            .await
            .expect("connect");

        let err = conn
            .execute("GET CCD.TEMP", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(conn.waiter.lock().is_none());
    }

    #[tokio::test]
    async fn test_exchanges_are_serialized() {
        let (device, port) = peer_socket().await;
        let conn = Arc::new(
            DatagramConnection::connect("127.0.0.1", port, PACKET)
                .await
                .expect("connect"),
        );

        tokio::spawn(async move {
            let mut buf = [0u8; 128];
            for _ in 0..2 {
                let (n, from) = device.recv_from(&mut buf).await.expect("recv");
                let end = buf[..n].iter().position(|&b| b == 0).unwrap_or(n);
                let reply = format!("**** OKAY {}", String::from_utf8_lossy(&buf[4..end]));
                device.send_to(reply.as_bytes(), from).await.expect("send");
            }
        });

        let a = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.execute("GET AAA", WAIT).await })
        };
        let b = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.execute("GET BBB", WAIT).await })
        };

        assert_eq!(a.await.expect("join").expect("a"), "AAA");
        assert_eq!(b.await.expect("join").expect("b"), "BBB");
    }
}
