//! Bounded checkout pool.
//!
//! Backs both the connection pool and the correlation-ID pool: a queue of
//! idle items counted by a semaphore, so waiters are served in FIFO order
//! and every checkout is bounded by a deadline.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │                 Pool<T>                   │
//! │  permits: Semaphore (one per idle item)   │
//! │  idle:    VecDeque<T>                     │
//! └───────────────────────────────────────────┘
//!        acquire(wait)  │  ▲  drop / discard
//!                       ▼  │
//!                  PoolGuard<'_, T>
//! ```
//!
//! A guard returns its item on drop. [`PoolGuard::discard`] drops the item
//! instead and leaves the pool one short until [`Pool::put`] refills it.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Error, Result};

// ============================================================================
// Pool
// ============================================================================

/// FIFO pool of interchangeable items.
///
/// # Example
///
/// ```ignore
/// let ids = Pool::new("correlation id", range.iter());
/// let id = ids.acquire(Duration::from_secs(5)).await?;
/// send(*id).await;
/// // `id` returns to the pool here
/// ```
pub struct Pool<T> {
    /// Name used in timeout errors and logs.
    name: &'static str,

    /// Idle items and the drained flag, updated together.
    idle: Mutex<Idle<T>>,

    /// One permit per idle item; closed once the pool is drained.
    permits: Semaphore,
}

struct Idle<T> {
    items: VecDeque<T>,
    drained: bool,
}

impl<T> Pool<T> {
    /// Creates a pool holding `items`.
    pub fn new(name: &'static str, items: impl IntoIterator<Item = T>) -> Self {
        let items: VecDeque<T> = items.into_iter().collect();
        let permits = Semaphore::new(items.len());
        Self {
            name,
            idle: Mutex::new(Idle {
                items,
                drained: false,
            }),
            permits,
        }
    }

    /// Checks out an item, waiting up to `wait`.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolTimeout`] if nothing became idle in time
    /// - [`Error::NotConnected`] if the pool was drained
    pub async fn acquire(&self, wait: Duration) -> Result<PoolGuard<'_, T>> {
        let permit = timeout(wait, self.permits.acquire())
            .await
            .map_err(|_| Error::pool_timeout(self.name, wait.as_millis() as u64))?
            .map_err(|_| Error::NotConnected)?;
        permit.forget();

        let item = self.idle.lock().items.pop_front().ok_or(Error::NotConnected)?;
        trace!(pool = self.name, available = self.available(), "Checked out");

        Ok(PoolGuard {
            pool: self,
            item: Some(item),
        })
    }

    /// Adds an item, waking one waiter.
    ///
    /// Items added to a drained pool are dropped.
    pub fn put(&self, item: T) {
        let mut idle = self.idle.lock();
        if idle.drained {
            drop(idle);
            trace!(pool = self.name, "Dropping item returned to drained pool");
            drop(item);
            return;
        }
        idle.items.push_back(item);
        self.permits.add_permits(1);
    }

    /// Number of idle items; zero once drained.
    #[must_use]
    pub fn available(&self) -> usize {
        if self.is_drained() {
            0
        } else {
            self.permits.available_permits()
        }
    }

    /// Returns `true` once [`Pool::drain`] ran.
    #[inline]
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.idle.lock().drained
    }

    /// Closes the pool and takes every idle item.
    ///
    /// Pending and future `acquire` calls fail; checked-out items are dropped
    /// when their guards are released.
    pub fn drain(&self) -> Vec<T> {
        let items: Vec<T> = {
            let mut idle = self.idle.lock();
            idle.drained = true;
            self.permits.close();
            idle.items.drain(..).collect()
        };
        debug!(pool = self.name, count = items.len(), "Pool drained");
        items
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("available", &self.available())
            .field("drained", &self.is_drained())
            .finish()
    }
}

// ============================================================================
// PoolGuard
// ============================================================================

/// Exclusive checkout of one pooled item.
pub struct PoolGuard<'a, T> {
    pool: &'a Pool<T>,
    item: Option<T>,
}

impl<T> PoolGuard<'_, T> {
    /// Drops the item without returning it.
    ///
    /// The pool stays one item short until refilled with [`Pool::put`].
    pub fn discard(mut self) {
        if let Some(item) = self.item.take() {
            debug!(pool = self.pool.name, "Discarding pooled item");
            drop(item);
        }
    }
}

impl<T> Deref for PoolGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `discard` and `drop` take the item, both consume the guard.
        self.item.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T: fmt::Debug> fmt::Debug for PoolGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolGuard")
            .field("pool", &self.pool.name)
            .field("item", &self.item)
            .finish()
    }
}

impl<T> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.put(item);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_acquire_and_release() {
        let pool = Pool::new("test", [1, 2]);
        assert_eq!(pool.available(), 2);

        {
            let item = pool.acquire(SHORT).await.expect("acquire");
            assert_eq!(*item, 1);
            assert_eq!(pool.available(), 1);
        }

        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let pool = Pool::new("test", [1, 2, 3]);
        let first = pool.acquire(SHORT).await.expect("acquire");
        drop(first);
        let order: Vec<i32> = {
            let a = pool.acquire(SHORT).await.expect("a");
            let b = pool.acquire(SHORT).await.expect("b");
            let c = pool.acquire(SHORT).await.expect("c");
            vec![*a, *b, *c]
        };
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_exhausted_pool_times_out() {
        let pool = Pool::new("connection", ["only"]);
        let _held = pool.acquire(SHORT).await.expect("acquire");

        let err = pool.acquire(SHORT).await.unwrap_err();
        assert!(matches!(err, Error::PoolTimeout { ref resource, .. } if resource == "connection"));
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_waiter_served_on_release() {
        let pool = Arc::new(Pool::new("test", [7]));
        let held = pool.acquire(SHORT).await.expect("acquire");

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(Duration::from_secs(2)).await.map(|g| *g) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert_eq!(waiter.await.expect("join").expect("acquire"), 7);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_discard_and_refill() {
        let pool = Pool::new("test", [1, 2]);
        pool.acquire(SHORT).await.expect("acquire").discard();
        assert_eq!(pool.available(), 1);

        pool.put(3);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_drain_rejects_acquire_and_drops_returns() {
        let pool = Pool::new("test", [1, 2]);
        let held = pool.acquire(SHORT).await.expect("acquire");

        let idle = pool.drain();
        assert_eq!(idle, vec![2]);
        assert!(pool.is_drained());
        assert!(matches!(
            pool.acquire(SHORT).await.unwrap_err(),
            Error::NotConnected
        ));

        drop(held);
        assert_eq!(pool.available(), 0);
    }

    #[tokio::test]
    async fn test_put_after_drain_is_dropped() {
        let pool = Pool::new("test", [1]);
        assert_eq!(pool.drain(), vec![1]);

        pool.put(2);
        assert_eq!(pool.available(), 0);
        assert!(pool.drain().is_empty());
    }

    #[tokio::test]
    async fn test_returns_racing_drain_never_stay_idle() {
        let pool = Arc::new(Pool::new("test", Vec::<u32>::new()));

        let returns = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                for item in 0..8 {
                    pool.put(item);
                    tokio::task::yield_now().await;
                }
            })
        };
        tokio::task::yield_now().await;
        let drained = pool.drain();
        returns.await.expect("join");

        assert!(drained.len() <= 8);
        assert_eq!(pool.available(), 0);
        assert!(pool.drain().is_empty());
    }

    #[tokio::test]
    async fn test_drain_wakes_waiters() {
        let pool = Arc::new(Pool::new("test", Vec::<u8>::new()));
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(Duration::from_secs(5)).await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.drain();

        let result = waiter.await.expect("join");
        assert!(matches!(result, Err(Error::NotConnected)));
    }
}
