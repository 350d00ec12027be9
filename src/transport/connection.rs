//! Line-protocol session.
//!
//! One [`LineConnection`] owns one byte stream (plain TCP or TLS) and runs
//! one correlated exchange at a time. Exclusive access comes from the pool
//! or mutex that holds it, so no event loop is needed.
//!
//! # Exchange
//!
//! ```text
//! execute(id, "GET MOUNT.RA")
//!   write "<id> GET MOUNT.RA\n"
//!   loop readline ─► ResponseCollector::feed
//!                      ├─ None            keep reading
//!                      ├─ Some(Ok(v))     return v
//!                      └─ Some(Err(e))    return e
//! ```
//!
//! The whole exchange, write included, runs under one deadline.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::protocol::line::{ResponseCollector, encode_request};

// ============================================================================
// Types
// ============================================================================

/// Byte stream a session can run on.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

// ============================================================================
// LineConnection
// ============================================================================

/// One established line-protocol session.
pub struct LineConnection {
    /// Buffered stream.
    stream: BufReader<Box<dyn Io>>,
    /// Peer label for logs.
    peer: String,
    /// Whether the session was upgraded to TLS.
    tls: bool,
}

impl LineConnection {
    /// Wraps an established stream.
    pub fn new(stream: impl Io + 'static, peer: impl Into<String>, tls: bool) -> Self {
        Self {
            stream: BufReader::new(Box::new(stream)),
            peer: peer.into(),
            tls,
        }
    }

    /// Peer label.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Returns `true` if the session runs over TLS.
    #[inline]
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Sends `command` tagged with `id` and waits for its terminal line.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if no terminal line arrived within `wait`
    /// - [`Error::CommandFailed`] on `"<id> COMMAND FAILED"`
    /// - [`Error::ConnectionClosed`] if the peer closed the stream
    /// - [`Error::Io`] on read or write failure
    pub async fn execute(
        &mut self,
        id: CorrelationId,
        command: &str,
        wait: Duration,
    ) -> Result<String> {
        let Self { stream, peer, .. } = self;
        let peer: &str = peer;

        let exchange = async {
            let request = encode_request(id, command);
            debug!(peer, id = %id, command, "Request sent");

            let writer = stream.get_mut();
            writer.write_all(request.as_bytes()).await?;
            writer.flush().await?;

            let mut collector = ResponseCollector::new(id);
            let mut line = String::new();
            loop {
                line.clear();
                if stream.read_line(&mut line).await? == 0 {
                    return Err(Error::ConnectionClosed);
                }
                trace!(peer, id = %id, line = line.trim_end(), "Line received");

                if let Some(result) = collector.feed(&line, command) {
                    return result;
                }
            }
        };

        match timeout(wait, exchange).await {
            Ok(result) => result,
            Err(_) => Err(Error::request_timeout(id, wait.as_millis() as u64)),
        }
    }

    /// Flushes and shuts down the write half.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.get_mut().shutdown().await {
            trace!(peer = %self.peer, error = %e, "Shutdown failed");
        }
        debug!(peer = %self.peer, "Connection closed");
    }
}

impl fmt::Debug for LineConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineConnection")
            .field("peer", &self.peer)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
