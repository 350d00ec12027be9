//! Wire formats spoken by the connectors.
//!
//! # Protocol Overview
//!
//! | Layer | TCP (`pilar`, `session`) | UDP (`udp`) |
//! |-------|--------------------------|-------------|
//! | Command text | `GET X` / `SET X=v` | `GET X` / `SET X=v` |
//! | Framing | `"<id> <text>\n"` | zero-padded fixed-size datagram |
//! | Success | `"<id> COMMAND COMPLETE"` | `"**** OKAY <payload>"` |
//! | Failure | `"<id> COMMAND FAILED"` | anything else |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command text built from a command definition |
//! | `datagram` | Fixed-size datagram framing |
//! | `line` | Line framing, response collection, TLS upgrade tokens |
//! | `status` | Structured `put`/`call` results |

// ============================================================================
// Submodules
// ============================================================================

/// Wire command text.
pub mod command;

/// Fixed-size datagram framing.
pub mod datagram;

/// Correlated line framing.
pub mod line;

/// Structured command results.
pub mod status;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Verb, WireCommand, wire_value};
pub use datagram::Reply;
pub use line::ResponseCollector;
pub use status::{CommandStatus, StatusKind};
