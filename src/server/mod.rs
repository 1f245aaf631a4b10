//! Accept loop and graceful shutdown (ambient A4).
//!
//! Provides an async `run` function that listens for inbound connections,
//! spawning one `ClientSession` per connection, generalizing the teacher's
//! mini-redis server bootstrap to this proxy's router/pool collaborators.

use std::future::Future;
use std::sync::Arc;

use log::info;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Semaphore};

use crate::metrics::Metrics;
use crate::router::BackendRouter;
use crate::session::SessionConfig;

mod listener;
pub(crate) mod shutdown;

use listener::Listener;

/// Run the proxy. Accepts connections from `listener` until `shutdown`
/// completes, then waits for in-flight sessions to drain before returning.
pub async fn run(
    listener: TcpListener,
    router: Arc<dyn BackendRouter>,
    metrics: Arc<dyn Metrics>,
    session_config: SessionConfig,
    max_connections: usize,
    shutdown: impl Future,
) {
    let (notify_shutdown, _) = broadcast::channel(1);
    let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel(1);

    let mut server = Listener {
        listener,
        router,
        metrics,
        session_config,
        limit_connections: Arc::new(Semaphore::new(max_connections)),
        notify_shutdown: notify_shutdown.clone(),
        shutdown_complete_tx,
    };

    tokio::select! {
        res = server.run() => {
            if let Err(err) = res {
                log::error!("accept loop error: {}", err);
            }
        }
        _ = shutdown => {
            info!("shutting down");
        }
    }

    let Listener {
        shutdown_complete_tx,
        notify_shutdown,
        ..
    } = server;

    drop(notify_shutdown);
    drop(shutdown_complete_tx);

    let _ = shutdown_complete_rx.recv().await;
}
