//! Connection pool (C4): a bounded set of upstream connections to one
//! backend, lent out one at a time.
//!
//! Grounded on `JasonkayZK-mini-redis/src/server/listener.rs`'s
//! `Arc<Semaphore>` connection-limiting idiom (`Listener::limit_connections`
//! / `acquire_owned`), adapted from "limit concurrent accepts" to "limit how
//! many upstream sockets to one backend may exist at once, and block a
//! checkout until one frees up". A semaphore permit is acquired once per
//! connection's lifetime and travels with it between the idle queue and
//! whichever session currently leases it; it is only ever released back to
//! the semaphore when the connection is permanently discarded (its
//! `ensure_connected` fails), which is exactly when spec section 4.4 says
//! "the connection is discarded (not returned to idle)".

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::error::PoolError;
use crate::upstream::connection::{ConnectionTimeouts, UpstreamConnection};
use crate::upstream::socket::Endpoint;

/// An upstream connection currently leased out of a pool. Carries the
/// semaphore permit that reserves its capacity slot, so returning it via
/// `ConnectionPool::checkin` is the only way to give the slot back.
pub struct PooledConnection {
    conn: UpstreamConnection,
    permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = UpstreamConnection;
    fn deref(&self) -> &UpstreamConnection {
        &self.conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut UpstreamConnection {
        &mut self.conn
    }
}

struct Idle(VecDeque<(UpstreamConnection, OwnedSemaphorePermit)>);

pub struct ConnectionPool {
    endpoint: Endpoint,
    timeouts: ConnectionTimeouts,
    idle: Mutex<Idle>,
    permits: Arc<Semaphore>,
    notify: Notify,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    pub fn new(
        endpoint: Endpoint,
        capacity: usize,
        timeouts: ConnectionTimeouts,
        acquire_timeout: Duration,
    ) -> Self {
        ConnectionPool {
            endpoint,
            timeouts,
            idle: Mutex::new(Idle(VecDeque::new())),
            permits: Arc::new(Semaphore::new(capacity)),
            notify: Notify::new(),
            acquire_timeout,
        }
    }

    /// Lend out an idle connection, creating one under capacity, or block
    /// until one is returned — all bounded by `acquire_timeout`.
    pub async fn checkout(&self) -> Result<PooledConnection, PoolError> {
        tokio::time::timeout(self.acquire_timeout, self.checkout_inner())
            .await
            .map_err(|_| PoolError::AcquireTimeout)?
    }

    async fn checkout_inner(&self) -> Result<PooledConnection, PoolError> {
        loop {
            let popped = { self.idle.lock().unwrap().0.pop_front() };
            if let Some((mut conn, permit)) = popped {
                if conn.ensure_connected().await.is_ok() {
                    return Ok(PooledConnection { conn, permit });
                }
                // Discard: the slot this permit reserved is freed for a
                // fresh connection.
                drop(permit);
                self.notify.notify_one();
                continue;
            }

            if let Ok(permit) = self.permits.clone().try_acquire_owned() {
                let mut conn = UpstreamConnection::new(self.endpoint.clone(), self.timeouts.clone());
                match conn.ensure_connected().await {
                    Ok(()) => return Ok(PooledConnection { conn, permit }),
                    Err(_) => {
                        drop(permit);
                        return Err(PoolError::BackendUnavailable);
                    }
                }
            }

            // At capacity and nothing idle: wait for a checkin or a
            // discard, then retry.
            self.notify.notified().await;
        }
    }

    /// Return a connection to the idle set. Accepts a disconnected
    /// connection too (e.g. one the transaction timeout watcher just
    /// disconnected) — it still occupies its slot and reconnects lazily on
    /// the next checkout.
    pub fn checkin(&self, pooled: PooledConnection) {
        self.idle
            .lock()
            .unwrap()
            .0
            .push_back((pooled.conn, pooled.permit));
        self.notify.notify_one();
    }

    /// Number of connections currently sitting idle. Exposed for tests that
    /// assert a connection was returned after a transaction ends or times
    /// out (spec section 8, property 6).
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap().0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT};

    fn timeouts() -> ConnectionTimeouts {
        ConnectionTimeouts {
            connect: DEFAULT_CONNECT_TIMEOUT,
            read: DEFAULT_READ_TIMEOUT,
            write: DEFAULT_WRITE_TIMEOUT,
        }
    }

    #[tokio::test]
    async fn checkout_fails_against_nothing_listening() {
        let pool = ConnectionPool::new(
            Endpoint::parse("127.0.0.1:1"),
            2,
            timeouts(),
            Duration::from_millis(200),
        );
        assert!(pool.checkout().await.is_err());
        assert_eq!(pool.idle_count(), 0);
    }
}
