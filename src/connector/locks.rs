//! Per-resource mutual exclusion.
//!
//! Commands that drive the same piece of hardware (both mount axes, the
//! dome shutter) are mapped to one resource name. Holding that resource's
//! mutex for the whole exchange keeps such commands from overlapping on the
//! wire, even when they run on different pooled sessions.
//!
//! The table is built once from the resource-lock map and never resized.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::debug;

use crate::config::ResourceLockMap;
use crate::error::{Error, Result};

// ============================================================================
// ResourceLocks
// ============================================================================

/// One FIFO mutex per distinct resource name.
#[derive(Debug, Default)]
pub struct ResourceLocks {
    /// Command name to resource name.
    map: ResourceLockMap,
    /// Resource name to mutex.
    locks: FxHashMap<String, Arc<Mutex<()>>>,
    /// Bound on the wait; unbounded when `None`.
    wait: Option<Duration>,
}

impl ResourceLocks {
    /// Builds the table from a command to resource map.
    #[must_use]
    pub fn new(map: &ResourceLockMap, wait: Option<Duration>) -> Self {
        let locks = map
            .resources()
            .into_iter()
            .map(|resource| (resource.to_string(), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            map: map.clone(),
            locks,
            wait,
        }
    }

    /// Resource guarding `command`, if any.
    #[inline]
    #[must_use]
    pub fn resource_for(&self, command: &str) -> Option<&str> {
        self.map.resource_for(command)
    }

    /// Locks the resource mapped to `command`.
    ///
    /// Returns `None` for unmapped commands, which run unsynchronized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the configured wait elapses.
    pub async fn acquire(&self, command: &str) -> Result<Option<OwnedMutexGuard<()>>> {
        let Some(resource) = self.map.resource_for(command) else {
            return Ok(None);
        };
        let Some(lock) = self.locks.get(resource) else {
            return Ok(None);
        };

        debug!(resource, command, "Waiting for resource lock");
        let lock = Arc::clone(lock);
        let guard = match self.wait {
            Some(wait) => timeout(wait, lock.lock_owned()).await.map_err(|_| {
                Error::timeout(
                    format!("resource lock '{resource}' for {command}"),
                    wait.as_millis() as u64,
                )
            })?,
            None => lock.lock_owned().await,
        };
        debug!(resource, command, "Resource lock acquired");

        Ok(Some(guard))
    }
}

// ============================================================================
// Tests
// ============================================================================
