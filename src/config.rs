//! Configuration surface recognized by the proxy (spec section 6).
//!
//! CLI flags take precedence over `.env`/environment values, which take
//! precedence over the built-in defaults below — the same layering as the
//! teacher's `dotenv().ok()` followed by `Cli::parse()` in `bin/server.rs`,
//! generalized from a single `--port` flag to the full set of options this
//! proxy needs. Every field below carries the `env` attribute pulling from
//! `REDIS_MUX_*`, so `dotenv().ok()` loading `.env` into the process
//! environment in `bin/server.rs` actually reaches `Cli::parse()`.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::consts::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_POOL_ACQUIRE_TIMEOUT, DEFAULT_POOL_SIZE, DEFAULT_PORT,
    DEFAULT_READ_TIMEOUT, DEFAULT_TRANSACTION_TIMEOUT, DEFAULT_WRITE_TIMEOUT, MAX_CONNECTIONS,
};

/// One upstream backend: its dial endpoint and the pool size reserved for it.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub endpoint: String,
    pub pool_size: usize,
}

/// Fully resolved proxy configuration. Constructed once at process start and
/// never mutated afterwards; sessions and pools are handed an `Arc` to it
/// (or copy the handful of fields they need out of it at construction time).
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub backends: Vec<BackendConfig>,
    pub multiplexing: bool,
    pub transaction_timeout: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub pool_acquire_timeout: Duration,
    pub max_connections: usize,
}

impl ProxyConfig {
    /// `multiplexing` is on precisely when more than one backend is
    /// configured, per spec section 6.
    pub fn from_cli(cli: Cli) -> Self {
        let backends: Vec<BackendConfig> = if cli.backend.is_empty() {
            vec![BackendConfig {
                endpoint: format!("127.0.0.1:{}", DEFAULT_PORT),
                pool_size: cli.pool_size,
            }]
        } else {
            cli.backend
                .iter()
                .map(|endpoint| BackendConfig {
                    endpoint: endpoint.clone(),
                    pool_size: cli.pool_size,
                })
                .collect()
        };

        let multiplexing = cli.multiplex || backends.len() > 1;

        ProxyConfig {
            listen_addr: SocketAddr::new(cli.bind.parse().unwrap_or_else(|_| {
                "0.0.0.0".parse().expect("hardcoded address is valid")
            }), cli.port),
            backends,
            multiplexing,
            transaction_timeout: Duration::from_millis(cli.transaction_timeout_ms),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            pool_acquire_timeout: DEFAULT_POOL_ACQUIRE_TIMEOUT,
            max_connections: cli.max_connections,
        }
    }
}

/// Command-line flags for `redis-mux-server`.
#[derive(Parser, Debug)]
#[clap(name = "redis-mux-server", version, author, about = "A Redis protocol multiplexing proxy")]
pub struct Cli {
    #[clap(long, env = "REDIS_MUX_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    #[clap(long, env = "REDIS_MUX_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Upstream backend endpoint, `host:port`. Repeat to shard across
    /// multiple backends; with zero or one, the proxy runs unsharded.
    #[clap(long = "backend", env = "REDIS_MUX_BACKEND", use_value_delimiter = true)]
    pub backend: Vec<String>,

    /// Force multiplexing (key-hashed sharding) even with a single backend.
    #[clap(long, env = "REDIS_MUX_MULTIPLEX")]
    pub multiplex: bool,

    #[clap(long, env = "REDIS_MUX_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    #[clap(long, env = "REDIS_MUX_TRANSACTION_TIMEOUT_MS", default_value_t = DEFAULT_TRANSACTION_TIMEOUT.as_millis() as u64)]
    pub transaction_timeout_ms: u64,

    #[clap(long, env = "REDIS_MUX_MAX_CONNECTIONS", default_value_t = MAX_CONNECTIONS)]
    pub max_connections: usize,
}
