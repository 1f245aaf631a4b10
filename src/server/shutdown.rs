use tokio::sync::broadcast;

/// Listens for the server's shutdown signal.
///
/// Wraps a `broadcast::Receiver` paired with the `Sender` the accept loop
/// holds. Once `recv` resolves, `is_shutdown` latches true for the rest of
/// this value's life, so callers can `select!` on `recv` in a loop without
/// re-triggering on a closed channel.
#[derive(Debug)]
pub(crate) struct Shutdown {
    shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub(crate) fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    pub(crate) async fn recv(&mut self) {
        if self.shutdown {
            return;
        }
        let _ = self.notify.recv().await;
        self.shutdown = true;
    }
}
