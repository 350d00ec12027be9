//! Line-oriented TCP framing.
//!
//! Every request is one line prefixed by its correlation ID. The peer
//! answers with any number of lines carrying the same prefix and ends the
//! exchange with a terminal status marker:
//!
//! ```text
//! > 1 GET MOUNT.RA
//! < 1 MOUNT.RA=12.5000
//! < 1 COMMAND COMPLETE
//! ```
//!
//! Lines tagged with another ID are ignored by the collector.
//!
//! # In-band TLS upgrade
//!
//! ```text
//! < ... TLS ...        (greeting advertises TLS)
//! > ENC TLS
//! < ENC OK             (acknowledgement, then TLS handshake on same socket)
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;

// ============================================================================
// Constants
// ============================================================================

/// Terminal success marker.
pub const COMMAND_COMPLETE: &str = "COMMAND COMPLETE";

/// Terminal failure marker.
pub const COMMAND_FAILED: &str = "COMMAND FAILED";

/// Value returned when the peer completes without sending a value line.
pub const DEFAULT_REPLY: &str = "OK";

/// Greeting token advertising TLS capability.
pub const TLS_TOKEN: &[u8] = b"TLS";

/// Upgrade request line.
pub const TLS_REQUEST: &[u8] = b"ENC TLS\n";

/// Token the upgrade acknowledgement must contain.
pub const TLS_ACK: &str = "ENC OK";

// ============================================================================
// Encoding
// ============================================================================

/// Builds the request line `"<id> <command>\n"`.
#[inline]
#[must_use]
pub fn encode_request(id: CorrelationId, command: &str) -> String {
    format!("{id} {command}\n")
}

/// Returns `true` if a greeting advertises TLS.
#[inline]
#[must_use]
pub fn greeting_offers_tls(greeting: &[u8]) -> bool {
    greeting
        .windows(TLS_TOKEN.len())
        .any(|window| window == TLS_TOKEN)
}

/// Returns `true` if an upgrade reply acknowledges the request.
#[inline]
#[must_use]
pub fn is_tls_ack(line: &str) -> bool {
    line.contains(TLS_ACK)
}

// ============================================================================
// ResponseCollector
// ============================================================================

/// Accumulates response lines for one correlation ID.
///
/// Feed every received line; the collector returns `Some` once a terminal
/// marker for its ID arrives.
#[derive(Debug)]
pub struct ResponseCollector {
    prefix: String,
    complete: String,
    failed: String,
    value: Option<String>,
}

impl ResponseCollector {
    /// Creates a collector for `id`.
    #[must_use]
    pub fn new(id: CorrelationId) -> Self {
        Self {
            prefix: format!("{id} "),
            complete: format!("{id} {COMMAND_COMPLETE}"),
            failed: format!("{id} {COMMAND_FAILED}"),
            value: None,
        }
    }

    /// Consumes one received line.
    ///
    /// Returns `None` while the exchange is still open, `Some(Ok(value))` on
    /// completion (the last captured value, or `"OK"`), and
    /// `Some(Err(Error::CommandFailed))` on the failure marker.
    pub fn feed(&mut self, line: &str, command: &str) -> Option<Result<String>> {
        let line = line.trim();

        if line.starts_with(&self.prefix)
            && let Some((_, rhs)) = line.split_once('=')
        {
            self.value = Some(rhs.trim().to_string());
        }

        if line.starts_with(&self.complete) {
            return Some(Ok(self
                .value
                .take()
                .unwrap_or_else(|| DEFAULT_REPLY.to_string())));
        }

        if line.starts_with(&self.failed) {
            return Some(Err(Error::command_failed(command, Some(line.to_string()))));
        }

        None
    }

    /// Value captured so far.
    #[inline]
    #[must_use]
    pub fn pending_value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

// ============================================================================
// Tests
// ============================================================================
