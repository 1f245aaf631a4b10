//! Transaction state machine and the pinned-lease mailbox that keeps one
//! upstream connection dedicated to a session across a `WATCH`/`MULTI`/`EXEC`
//! sequence.
//!
//! The mailbox is the design note from SPEC_FULL.md section 9: a one-slot
//! handoff typed as `Idle(Connection) | InFlight | Reclaimed` rather than a
//! channel closed-and-reopened on every batch. The worker CAS-transitions
//! `Idle -> InFlight` (and back to `Idle` on release); the timeout watcher
//! CAS-transitions `Idle -> Reclaimed`. Because only one side ever sees
//! `Idle`, there's no race between a batch finishing and the watcher firing
//! at the same instant.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::command::Transition;
use crate::metrics::Metrics;
use crate::upstream::{ConnectionPool, PooledConnection};

/// A session's transaction mode, per SPEC_FULL.md section 4.6's state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    None,
    Pre,
    Multi,
}

impl Default for TransactionMode {
    fn default() -> Self {
        TransactionMode::None
    }
}

impl TransactionMode {
    /// Apply one transaction-affecting transition. Combinations the state
    /// table leaves blank are no-ops: the mode is unchanged.
    pub fn apply(self, transition: Transition) -> TransactionMode {
        use TransactionMode::*;
        use Transition::*;
        match (self, transition) {
            (None, Watch) => Pre,
            (None, Multi) => Multi,
            (Pre, Multi) => Multi,
            (Pre, Unwatch) => None,
            (Multi, ExecOrDiscard) => None,
            (mode, _) => mode,
        }
    }
}

enum LeaseSlot {
    Idle(PooledConnection),
    InFlight,
    Reclaimed,
}

/// The single-slot mailbox pinning an upstream connection to a session for
/// the lifetime of a transaction.
pub struct Lease {
    slot: Mutex<LeaseSlot>,
}

impl Lease {
    pub fn new(conn: PooledConnection) -> Arc<Lease> {
        Arc::new(Lease {
            slot: Mutex::new(LeaseSlot::Idle(conn)),
        })
    }

    /// `Idle -> InFlight`. Returns the connection, or `None` if the timeout
    /// watcher already reclaimed it.
    pub fn take(&self) -> Option<PooledConnection> {
        let mut guard = self.slot.lock().unwrap();
        match std::mem::replace(&mut *guard, LeaseSlot::InFlight) {
            LeaseSlot::Idle(conn) => Some(conn),
            other => {
                *guard = other;
                None
            }
        }
    }

    /// `InFlight -> Idle`, handing the connection back for the next batch.
    pub fn put_back(&self, conn: PooledConnection) {
        *self.slot.lock().unwrap() = LeaseSlot::Idle(conn);
    }

    /// `Idle -> Reclaimed`. Used only by the timeout watcher; returns the
    /// connection if it found the slot idle (no batch in flight).
    fn try_reclaim(&self) -> Option<PooledConnection> {
        let mut guard = self.slot.lock().unwrap();
        match std::mem::replace(&mut *guard, LeaseSlot::Reclaimed) {
            LeaseSlot::Idle(conn) => Some(conn),
            other => {
                *guard = other;
                None
            }
        }
    }
}

/// Arm the timeout watcher for a freshly-installed lease. Races the
/// transaction's done-signal against `transaction_timeout`; on timeout it
/// tries to reclaim the lease, and if the slot was idle, disconnects and
/// returns the connection to `pool` and leaves the slot `Reclaimed` so the
/// next flush on this session observes `TransactionTimeout`.
pub fn spawn_timeout_watcher(
    lease: Arc<Lease>,
    pool: Arc<ConnectionPool>,
    transaction_timeout: Duration,
    mut done_rx: oneshot::Receiver<()>,
    metrics: Arc<dyn Metrics>,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = &mut done_rx => {}
            _ = tokio::time::sleep(transaction_timeout) => {
                if let Some(mut conn) = lease.try_reclaim() {
                    conn.disconnect();
                    metrics.counter("disconnect");
                    pool.checkin(conn);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_then_multi_then_exec() {
        let mut mode = TransactionMode::None;
        mode = mode.apply(Transition::Watch);
        assert_eq!(mode, TransactionMode::Pre);
        mode = mode.apply(Transition::Multi);
        assert_eq!(mode, TransactionMode::Multi);
        mode = mode.apply(Transition::ExecOrDiscard);
        assert_eq!(mode, TransactionMode::None);
    }

    #[test]
    fn multi_directly_from_none() {
        let mode = TransactionMode::None.apply(Transition::Multi);
        assert_eq!(mode, TransactionMode::Multi);
    }

    #[test]
    fn unwatch_from_pre_returns_to_none() {
        let mode = TransactionMode::Pre.apply(Transition::Unwatch);
        assert_eq!(mode, TransactionMode::None);
    }

    #[test]
    fn undefined_transitions_are_no_ops() {
        let mode = TransactionMode::Multi.apply(Transition::Watch);
        assert_eq!(mode, TransactionMode::Multi);
    }
}
