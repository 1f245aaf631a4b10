//! Client session (C6): per-client state machine tying the read loop,
//! command classifier, transaction pinning, and flush routine together.
//!
//! Grounded on `JasonkayZK-mini-redis/src/server/handler.rs` for the overall
//! per-connection task shape (own the socket, select against shutdown, run
//! until EOF or shutdown), generalized from "one `Handler` applying commands
//! to a local `Db`" to "a reader task feeding a worker that forwards
//! commands upstream".

mod reader;
pub mod transaction;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::consts::READ_CHANNEL_CAPACITY;
use crate::metrics::Metrics;
use crate::router::BackendRouter;
use crate::server::shutdown::Shutdown;

/// Per-client configuration copied out of `ProxyConfig` at construction time
/// (SPEC_FULL.md section 3: "never mutated after construction").
#[derive(Clone)]
pub struct SessionConfig {
    pub multiplexing: bool,
    pub batch_cap: usize,
    pub transaction_timeout: Duration,
}

/// Run one client session to completion: split the socket, spawn the reader
/// task, and drive the worker loop on the current task until the session
/// ends. Crate-internal: sessions are spawned by the accept loop
/// (`server::listener`), never constructed directly by a consumer of this
/// library.
pub(crate) async fn run<S>(
    socket: S,
    config: SessionConfig,
    router: Arc<dyn BackendRouter>,
    metrics: Arc<dyn Metrics>,
    shutdown: Shutdown,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(socket);
    let (tx, rx) = mpsc::channel(READ_CHANNEL_CAPACITY);

    tokio::spawn(reader::run(read_half, tx, shutdown));

    worker::run(
        rx,
        write_half,
        router,
        config.multiplexing,
        config.batch_cap,
        config.transaction_timeout,
        metrics,
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::broadcast;

    use crate::metrics::NopMetrics;
    use crate::resp::{command_frame, reply};
    use crate::router::SinglePoolRouter;
    use crate::upstream::{ConnectionPool, ConnectionTimeouts, Endpoint};

    /// A minimal stand-in Redis: understands both the RESP multi-bulk frames
    /// a client session forwards verbatim and the plain inline commands
    /// `UpstreamConnection` sends for its own `SELECT`/`PING` side-channel.
    async fn spawn_fake_backend() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = BytesMut::with_capacity(4096);
                    loop {
                        match next_reply(&mut buf) {
                            Some(Some(reply)) => {
                                if socket.write_all(reply).await.is_err() {
                                    return;
                                }
                                continue;
                            }
                            Some(None) => return,
                            None => {}
                        }
                        let mut chunk = [0u8; 1024];
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                });
            }
        });
        addr
    }

    /// `None`: need more bytes. `Some(None)`: malformed, close the
    /// connection. `Some(Some(reply))`: one command consumed, reply ready.
    fn next_reply(buf: &mut BytesMut) -> Option<Option<&'static [u8]>> {
        if buf.is_empty() {
            return None;
        }
        if buf[0] == b'*' {
            return match command_frame::scan(buf) {
                Ok(Some(cmd)) => Some(Some(reply_for(cmd.name()))),
                Ok(None) => None,
                Err(_) => Some(None),
            };
        }
        let pos = buf.windows(2).position(|w| w == b"\r\n")?;
        let line = buf.split_to(pos + 2);
        let name = std::str::from_utf8(&line[..pos])
            .unwrap_or("")
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        Some(Some(reply_for(&name)))
    }

    fn reply_for(name: &str) -> &'static [u8] {
        match name {
            "select" => b"+OK\r\n",
            "ping" => b"+PONG\r\n",
            "get" => b"$-1\r\n",
            _ => b"+OK\r\n",
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            multiplexing: false,
            batch_cap: crate::consts::DEFAULT_BATCH_CAP,
            transaction_timeout: Duration::from_millis(200),
        }
    }

    async fn router_to_fake_backend() -> Arc<dyn BackendRouter> {
        let (router, _pool) = pool_and_router().await;
        router
    }

    async fn pool_and_router() -> (Arc<dyn BackendRouter>, Arc<ConnectionPool>) {
        let addr = spawn_fake_backend().await;
        let pool = Arc::new(ConnectionPool::new(
            Endpoint::parse(&addr.to_string()),
            1,
            ConnectionTimeouts {
                connect: Duration::from_secs(1),
                read: Duration::from_secs(1),
                write: Duration::from_secs(1),
            },
            Duration::from_secs(1),
        ));
        let router: Arc<dyn BackendRouter> = Arc::new(SinglePoolRouter::new(pool.clone()));
        (router, pool)
    }

    #[tokio::test]
    async fn ping_is_intercepted_without_touching_upstream() {
        let router = router_to_fake_backend().await;
        let (mut client, server) = duplex(4096);
        let (_tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run(server, test_config(), router, Arc::new(NopMetrics), Shutdown::new(rx)));

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let mut reply = [0u8; 32];
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"+PONG\r\n");

        client.write_all(b"*1\r\n$4\r\nQUIT\r\n").await.unwrap();
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"+OK\r\n");

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn select_then_get_is_forwarded_upstream() {
        let router = router_to_fake_backend().await;
        let (mut client, server) = duplex(4096);
        let (_tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run(server, test_config(), router, Arc::new(NopMetrics), Shutdown::new(rx)));

        client.write_all(b"*2\r\n$6\r\nSELECT\r\n$1\r\n1\r\n").await.unwrap();
        let mut reply = [0u8; 32];
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"+OK\r\n");

        client.write_all(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n").await.unwrap();
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"$-1\r\n");

        client.write_all(b"*1\r\n$4\r\nQUIT\r\n").await.unwrap();
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"+OK\r\n");

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unsupported_command_while_multiplexing_is_rejected() {
        let router = router_to_fake_backend().await;
        let (mut client, server) = duplex(4096);
        let (_tx, rx) = broadcast::channel(1);

        let mut config = test_config();
        config.multiplexing = true;

        let handle = tokio::spawn(run(server, config, router, Arc::new(NopMetrics), Shutdown::new(rx)));

        client.write_all(b"*1\r\n$4\r\nMGET\r\n").await.unwrap();
        let mut reply = [0u8; 64];
        let n = client.read(&mut reply).await.unwrap();
        assert!(reply[..n].starts_with(b"-ERR"));

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn transaction_happy_path_releases_the_pinned_connection() {
        let (router, pool) = pool_and_router().await;
        let (mut client, server) = duplex(4096);
        let (_tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run(server, test_config(), router, Arc::new(NopMetrics), Shutdown::new(rx)));

        let mut reply = [0u8; 32];
        for cmd in [
            &b"*2\r\n$5\r\nWATCH\r\n$1\r\nx\r\n"[..],
            &b"*1\r\n$5\r\nMULTI\r\n"[..],
            &b"*3\r\n$3\r\nSET\r\n$1\r\nx\r\n$1\r\nv\r\n"[..],
            &b"*1\r\n$4\r\nEXEC\r\n"[..],
        ] {
            client.write_all(cmd).await.unwrap();
            let n = client.read(&mut reply).await.unwrap();
            assert_eq!(&reply[..n], b"+OK\r\n");
        }

        // After EXEC ends the transaction, the connection is checked back in
        // rather than held pinned.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.idle_count(), 1);

        client.write_all(b"*1\r\n$4\r\nQUIT\r\n").await.unwrap();
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"+OK\r\n");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn transaction_timeout_reclaims_the_pinned_connection() {
        let (router, pool) = pool_and_router().await;
        let (mut client, server) = duplex(4096);
        let (_tx, rx) = broadcast::channel(1);

        let mut config = test_config();
        config.transaction_timeout = Duration::from_millis(30);

        let handle = tokio::spawn(run(server, config, router, Arc::new(NopMetrics), Shutdown::new(rx)));

        client.write_all(b"*1\r\n$5\r\nMULTI\r\n").await.unwrap();
        let mut reply = [0u8; 32];
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"+OK\r\n");

        // Pin a connection, then go quiet until the watcher reclaims it.
        client.write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nx\r\n$1\r\nv\r\n").await.unwrap();
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"+OK\r\n");

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(pool.idle_count(), 1);

        client.write_all(b"*1\r\n$4\r\nEXEC\r\n").await.unwrap();
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"-ERR transaction timeout\r\n");

        handle.await.unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Spec section 8, item 1: N commands forwarded in a batch produce
        /// exactly N replies, in the same order, regardless of batch size.
        #[test]
        fn n_forwarded_commands_produce_n_replies_in_order(n in 1usize..12) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async move {
                let router = router_to_fake_backend().await;
                let (client, server) = duplex(16 * 1024);
                let (_tx, rx) = broadcast::channel(1);
                let (client_read, mut client_write) = tokio::io::split(client);
                let mut client_read = BufReader::new(client_read);

                let handle = tokio::spawn(run(server, test_config(), router, Arc::new(NopMetrics), Shutdown::new(rx)));

                for i in 0..n {
                    let key = format!("k{}", i);
                    let cmd = format!("*2\r\n$3\r\nGET\r\n${}\r\n{}\r\n", key.len(), key);
                    client_write.write_all(cmd.as_bytes()).await.unwrap();
                }

                let mut replies_seen = 0usize;
                for _ in 0..n {
                    let mut sink = Vec::new();
                    reply::copy_reply(&mut client_read, &mut sink).await.unwrap();
                    prop_assert_eq!(&sink, b"$-1\r\n");
                    replies_seen += 1;
                }
                prop_assert_eq!(replies_seen, n);

                client_write.write_all(b"*1\r\n$4\r\nQUIT\r\n").await.unwrap();
                let mut buf = [0u8; 32];
                let r = client_read.read(&mut buf).await.unwrap();
                prop_assert_eq!(&buf[..r], b"+OK\r\n".as_ref());

                handle.await.unwrap();
                Ok(())
            })?;
        }
    }
}
