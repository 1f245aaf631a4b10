//! Backend router (C5): decides which upstream pool a command's key belongs
//! to. Unsharded deployments route everything to the one configured pool;
//! sharded deployments hash the command's first argument.

mod crc16;

use std::sync::Arc;

use crate::resp::CommandFrame;
use crate::upstream::ConnectionPool;

/// Picks the upstream pool a given command should be sent to.
pub trait BackendRouter: Send + Sync {
    fn route(&self, cmd: &CommandFrame) -> Arc<ConnectionPool>;

    /// All pools this router can route to, for startup/shutdown bookkeeping.
    fn pools(&self) -> &[Arc<ConnectionPool>];
}

/// The unsharded case: exactly one backend, always chosen.
pub struct SinglePoolRouter {
    pool: [Arc<ConnectionPool>; 1],
}

impl SinglePoolRouter {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        SinglePoolRouter { pool: [pool] }
    }
}

impl BackendRouter for SinglePoolRouter {
    fn route(&self, _cmd: &CommandFrame) -> Arc<ConnectionPool> {
        self.pool[0].clone()
    }

    fn pools(&self) -> &[Arc<ConnectionPool>] {
        &self.pool
    }
}

/// The sharded case: the command's first argument (its key) is hashed with
/// Redis Cluster's keyslot algorithm and reduced modulo the backend count.
/// Commands with no first argument (e.g. `PING`) fall back to backend 0.
pub struct ShardedRouter {
    pools: Vec<Arc<ConnectionPool>>,
}

impl ShardedRouter {
    pub fn new(pools: Vec<Arc<ConnectionPool>>) -> Self {
        assert!(!pools.is_empty(), "a sharded router needs at least one backend");
        ShardedRouter { pools }
    }
}

impl BackendRouter for ShardedRouter {
    fn route(&self, cmd: &CommandFrame) -> Arc<ConnectionPool> {
        let index = match cmd.first_arg() {
            Some(key) => crc16::hash_slot(key) as usize % self.pools.len(),
            None => 0,
        };
        self.pools[index].clone()
    }

    fn pools(&self) -> &[Arc<ConnectionPool>] {
        &self.pools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{ConnectionPool, ConnectionTimeouts, Endpoint};
    use crate::resp::command_frame::scan;
    use bytes::BytesMut;
    use std::time::Duration;

    fn pool(port: u16) -> Arc<ConnectionPool> {
        Arc::new(ConnectionPool::new(
            Endpoint::parse(&format!("127.0.0.1:{}", port)),
            1,
            ConnectionTimeouts {
                connect: Duration::from_millis(100),
                read: Duration::from_millis(100),
                write: Duration::from_millis(100),
            },
            Duration::from_millis(100),
        ))
    }

    fn frame(raw: &[u8]) -> CommandFrame {
        let mut buf = BytesMut::from(raw);
        scan(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn single_pool_router_always_returns_the_same_pool() {
        let p = pool(1);
        let router = SinglePoolRouter::new(p.clone());
        let cmd = frame(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
        assert!(Arc::ptr_eq(&router.route(&cmd), &p));
    }

    #[test]
    fn sharded_router_is_consistent_for_the_same_key() {
        let pools = vec![pool(1), pool(2), pool(3)];
        let router = ShardedRouter::new(pools);
        let a = frame(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
        let b = frame(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
        assert!(Arc::ptr_eq(&router.route(&a), &router.route(&b)));
    }

    #[test]
    fn sharded_router_falls_back_to_backend_zero_with_no_key() {
        let pools = vec![pool(1), pool(2)];
        let router = ShardedRouter::new(pools);
        let cmd = frame(b"*1\r\n$4\r\nPING\r\n");
        assert!(Arc::ptr_eq(&router.route(&cmd), &router.pools()[0]));
    }
}
