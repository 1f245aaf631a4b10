//! redis-mux server.
//!
//! Entry point: parses CLI/`.env` configuration, builds one connection pool
//! per backend and the matching router, then runs the proxy until
//! `Ctrl-C`.

use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use log::info;
use tokio::net::TcpListener;

use redis_mux::config::{Cli, ProxyConfig};
use redis_mux::logger;
use redis_mux::metrics::NopMetrics;
use redis_mux::router::{BackendRouter, ShardedRouter, SinglePoolRouter};
use redis_mux::session::SessionConfig;
use redis_mux::upstream::{ConnectionPool, ConnectionTimeouts, Endpoint};

#[tokio::main]
pub async fn main() -> std::io::Result<()> {
    dotenv().ok();
    logger::init();

    let config = ProxyConfig::from_cli(Cli::parse());

    let timeouts = ConnectionTimeouts {
        connect: config.connect_timeout,
        read: config.read_timeout,
        write: config.write_timeout,
    };

    let pools: Vec<Arc<ConnectionPool>> = config
        .backends
        .iter()
        .map(|backend| {
            Arc::new(ConnectionPool::new(
                Endpoint::parse(&backend.endpoint),
                backend.pool_size,
                timeouts.clone(),
                config.pool_acquire_timeout,
            ))
        })
        .collect();

    let router: Arc<dyn BackendRouter> = if config.multiplexing {
        Arc::new(ShardedRouter::new(pools))
    } else {
        Arc::new(SinglePoolRouter::new(pools[0].clone()))
    };

    let session_config = SessionConfig {
        multiplexing: config.multiplexing,
        batch_cap: redis_mux::consts::DEFAULT_BATCH_CAP,
        transaction_timeout: config.transaction_timeout,
    };

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("redis-mux listening on {}", config.listen_addr);

    redis_mux::server::run(
        listener,
        router,
        Arc::new(NopMetrics),
        session_config,
        config.max_connections,
        tokio::signal::ctrl_c(),
    )
    .await;

    Ok(())
}
