use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time;

use crate::metrics::Metrics;
use crate::router::BackendRouter;
use crate::server::shutdown::Shutdown;
use crate::session::{self, SessionConfig};

/// Accept loop state. Generalizes the teacher's `Listener`: instead of
/// handing each accepted socket to a `Handler` bound to a local `Db`, it
/// spawns a `ClientSession` bound to a `BackendRouter`.
pub(crate) struct Listener {
    pub(crate) listener: TcpListener,
    pub(crate) router: Arc<dyn BackendRouter>,
    pub(crate) metrics: Arc<dyn Metrics>,
    pub(crate) session_config: SessionConfig,
    pub(crate) limit_connections: Arc<Semaphore>,
    pub(crate) notify_shutdown: broadcast::Sender<()>,
    pub(crate) shutdown_complete_tx: mpsc::Sender<()>,
}

impl Listener {
    pub(crate) async fn run(&mut self) -> std::io::Result<()> {
        info!(
            "redis-mux listening on {}",
            self.listener.local_addr()?
        );

        loop {
            let permit = self.limit_connections.clone().acquire_owned().await.unwrap();

            let socket = self.accept().await?;
            let router = self.router.clone();
            let metrics = self.metrics.clone();
            let session_config = self.session_config.clone();
            let shutdown = Shutdown::new(self.notify_shutdown.subscribe());
            let shutdown_complete = self.shutdown_complete_tx.clone();

            tokio::spawn(async move {
                session::run(socket, session_config, router, metrics, shutdown).await;
                drop(shutdown_complete);
                drop(permit);
            });
        }
    }

    /// Accept an inbound connection, retrying transient errors with
    /// exponential backoff up to a 64-second wait, mirroring the teacher's
    /// `Listener::accept`.
    async fn accept(&mut self) -> std::io::Result<TcpStream> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok((socket, _)) => return Ok(socket),
                Err(err) => {
                    if backoff > 64 {
                        error!("failed to accept socket after retry: {}", err);
                        return Err(err);
                    }
                    error!("failed to accept socket: {}", err);
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}
