//! Pool of reusable network clients.
//!
//! Building a client is comparatively expensive and each client keeps its own
//! keep-alive connections, so workers borrow clients from a shared pool instead
//! of creating one per chunk.
//!
//! Borrowing is scoped: [`ClientPool::acquire`] returns a [`PooledClient`]
//! guard that puts the client back when dropped, so every acquired client is
//! released exactly once on every exit path, including panics and early
//! returns from a failed chunk.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::transport::TransportError;

type ClientFactory<C> = Box<dyn Fn() -> Result<C, TransportError> + Send + Sync>;

/// Counters describing pool usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Clients constructed by the factory.
    pub created: usize,
    /// Successful acquisitions.
    pub acquired: usize,
    /// Clients returned to the pool.
    pub released: usize,
    /// Clients currently idle in the pool.
    pub idle: usize,
    /// Clients disposed by `drain`.
    pub drained: usize,
}

impl PoolStats {
    /// Clients currently checked out.
    pub fn in_use(&self) -> usize {
        self.acquired.saturating_sub(self.released)
    }
}

/// Thread-safe pool of lazily created clients.
pub struct ClientPool<C> {
    factory: ClientFactory<C>,
    idle: Mutex<Vec<C>>,
    created: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
    drained: AtomicUsize,
}

impl<C> ClientPool<C> {
    /// Create an empty pool that builds clients with `factory` on demand.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<C, TransportError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            idle: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            drained: AtomicUsize::new(0),
        }
    }

    /// Borrow a client, reusing an idle one or creating a new one.
    ///
    /// Never blocks on other borrowers; the number of live clients is bounded
    /// by the number of concurrent callers.
    pub fn acquire(&self) -> Result<PooledClient<'_, C>, TransportError> {
        let reused = self.idle.lock().pop();

        let client = match reused {
            Some(client) => client,
            None => {
                let client = (self.factory)()?;
                let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(created, "Created pooled client");
                client
            }
        };

        self.acquired.fetch_add(1, Ordering::Relaxed);
        Ok(PooledClient {
            pool: self,
            client: Some(client),
        })
    }

    /// Dispose of every idle client. Returns how many were dropped.
    ///
    /// Idempotent; clients still checked out are unaffected and return to the
    /// pool when their guard drops.
    pub fn drain(&self) -> usize {
        let disposed: Vec<C> = std::mem::take(&mut *self.idle.lock());
        let count = disposed.len();
        drop(disposed);

        if count > 0 {
            self.drained.fetch_add(count, Ordering::Relaxed);
            debug!(count, "Drained client pool");
        }
        count
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            idle: self.idle.lock().len(),
            drained: self.drained.load(Ordering::Relaxed),
        }
    }

    fn put_back(&self, client: C) {
        self.idle.lock().push(client);
        self.released.fetch_add(1, Ordering::Relaxed);
    }
}

impl<C> fmt::Debug for ClientPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientPool")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// A client checked out of a [`ClientPool`].
///
/// Dereferences to the client. Dropping the guard returns the client.
pub struct PooledClient<'a, C> {
    pool: &'a ClientPool<C>,
    client: Option<C>,
}

impl<C> PooledClient<'_, C> {
    /// Return the client to the pool now rather than at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl<C> Deref for PooledClient<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only `Drop` takes the client out.
        self.client.as_ref().expect("pooled client already released")
    }
}

impl<C> Drop for PooledClient<'_, C> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.put_back(client);
        }
    }
}
