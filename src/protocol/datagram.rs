//! Fixed-size datagram framing.
//!
//! Requests are the command text right-padded with zero bytes to exactly
//! the configured packet size. Replies are read up to the first zero byte;
//! a success reply starts with a fixed marker:
//!
//! ```text
//! **** OKAY 12.5000
//! └──10────┘└payload┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Success marker at the start of a reply.
pub const OKAY_MARKER: &str = "**** OKAY";

/// Bytes stripped from a success reply (marker plus separator).
pub const OKAY_PREFIX_LEN: usize = 10;

// ============================================================================
// Reply
// ============================================================================

/// Decoded datagram reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Success; holds the payload after the marker.
    Okay(String),
    /// Any reply without the success marker.
    Rejected(String),
}

impl Reply {
    /// Converts into the payload, mapping a rejection to a command failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] for a rejected reply.
    pub fn into_result(self, command: &str) -> Result<String> {
        match self {
            Self::Okay(payload) => Ok(payload),
            Self::Rejected(text) => Err(Error::command_failed(command, Some(text))),
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes `command` into a zero-padded packet of `packet_size` bytes.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the command does not fit.
pub fn encode(command: &str, packet_size: usize) -> Result<Vec<u8>> {
    let bytes = command.as_bytes();
    if bytes.len() > packet_size {
        return Err(Error::invalid_argument(format!(
            "Command is {} bytes, packet size is {packet_size}: {command}",
            bytes.len()
        )));
    }

    let mut packet = vec![0u8; packet_size];
    packet[..bytes.len()].copy_from_slice(bytes);
    Ok(packet)
}

/// Decodes a reply datagram.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the text before the first zero byte is
/// not valid UTF-8.
pub fn decode(datagram: &[u8]) -> Result<Reply> {
    let end = datagram
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(datagram.len());

    let text = std::str::from_utf8(&datagram[..end])
        .map_err(|e| Error::protocol(format!("Reply is not valid UTF-8: {e}")))?;

    if text.starts_with(OKAY_MARKER) {
        let payload = text.get(OKAY_PREFIX_LEN..).unwrap_or_default();
        Ok(Reply::Okay(payload.trim().to_string()))
    } else {
        Ok(Reply::Rejected(text.trim().to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
