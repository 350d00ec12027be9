//! Transport layer.
//!
//! Sessions, sockets and the pools that hand them out.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────┐                  ┌──────────────┐
//! │ Pool<LineConnection>  │◄── TCP / TLS ───►│ Mount        │
//! │ Pool<CorrelationId>   │                  │ controller   │
//! └───────────────────────┘                  └──────────────┘
//! ┌───────────────────────┐                  ┌──────────────┐
//! │ DatagramConnection    │◄───── UDP ──────►│ Camera       │
//! └───────────────────────┘                  └──────────────┘
//! ```
//!
//! # Session Lifecycle
//!
//! 1. `Negotiator::open` - TCP connect, greeting, optional TLS upgrade
//! 2. `Pool::put` - Session becomes available for checkout
//! 3. `Pool::acquire` - Exclusive use for one exchange
//! 4. `PoolGuard` drop - Session returns, or `discard` on transport fault
//! 5. `Pool::drain` - Idle sessions closed on disconnect
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Line-protocol session |
//! | `datagram` | Connected UDP socket |
//! | `negotiate` | Session opening and TLS upgrade |
//! | `pool` | Bounded checkout pool |

// ============================================================================
// Submodules
// ============================================================================

/// Line-protocol session.
pub mod connection;

/// Connected UDP socket.
pub mod datagram;

/// Session opening and TLS upgrade.
pub mod negotiate;

/// Bounded checkout pool.
pub mod pool;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::LineConnection;
pub use datagram::DatagramConnection;
pub use negotiate::Negotiator;
pub use pool::{Pool, PoolGuard};
