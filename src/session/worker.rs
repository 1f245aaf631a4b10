//! Worker loop and flush routine (part of C6): classifies each command,
//! batches forwardable ones, and drives the flush routine in SPEC_FULL.md
//! section 4.6 against whichever upstream connection the batch should use.
//!
//! Grounded on `JasonkayZK-mini-redis/src/cmd/mod.rs`'s classify-then-apply
//! dispatch, generalized from "build and apply a typed command" to
//! "classify, queue or intercept, and periodically flush the queue upstream".

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::command::{classify, Decision, Intercept};
use crate::error::SessionError;
use crate::metrics::Metrics;
use crate::resp::{reply, CommandFrame};
use crate::resp::parse::parse_decimal;
use crate::router::BackendRouter;
use crate::session::reader::ReadItem;
use crate::session::transaction::{spawn_timeout_watcher, Lease, TransactionMode};
use crate::upstream::{ConnectionPool, PooledConnection};

#[derive(Default)]
struct State {
    database_id: u64,
    transaction_mode: TransactionMode,
    lease: Option<Arc<Lease>>,
    /// The pool the pinned connection was checked out from. Recorded once
    /// when the pin is installed rather than re-derived from each batch's
    /// `router.route(...)`, since a later batch in the same transaction may
    /// key-hash to a different shard and must still use the connection
    /// already pinned, not a freshly routed pool.
    pinned_pool: Option<Arc<ConnectionPool>>,
    done_tx: Option<oneshot::Sender<()>>,
}

/// Drain `rx`, classifying and batching commands, until the reader reports
/// EOF/shutdown or a fatal error terminates the session.
pub async fn run<W>(
    mut rx: mpsc::Receiver<ReadItem>,
    mut writer: W,
    router: Arc<dyn BackendRouter>,
    multiplexing: bool,
    batch_cap: usize,
    transaction_timeout: Duration,
    metrics: Arc<dyn Metrics>,
) where
    W: AsyncWrite + Unpin + Send,
{
    let mut state = State::default();
    let mut queue: Vec<CommandFrame> = Vec::new();
    let batch_cap = if multiplexing { 1 } else { batch_cap };

    loop {
        let item = if queue.is_empty() {
            match rx.recv().await {
                Some(item) => item,
                None => break,
            }
        } else {
            match rx.try_recv() {
                Ok(item) => item,
                Err(mpsc::error::TryRecvError::Empty) => {
                    if let Err(e) =
                        flush_batch(&mut state, &mut queue, &mut writer, &router, transaction_timeout, &metrics)
                            .await
                    {
                        if report(&mut writer, &e).await.is_break() {
                            break;
                        }
                    }
                    continue;
                }
                Err(mpsc::error::TryRecvError::Disconnected) => ReadItem::Eof,
            }
        };

        match item {
            ReadItem::Eof => {
                if !queue.is_empty() {
                    let _ = flush_batch(
                        &mut state,
                        &mut queue,
                        &mut writer,
                        &router,
                        transaction_timeout,
                        &metrics,
                    )
                    .await;
                }
                let _ = report(&mut writer, &SessionError::ClientGone).await;
                break;
            }
            ReadItem::Error(e) => {
                let session_err = SessionError::Protocol(e);
                let _ = report(&mut writer, &session_err).await;
                break;
            }
            ReadItem::Frame(frame) => {
                let should_break = match classify(&frame, multiplexing) {
                    Decision::Unsupported => {
                        report(&mut writer, &SessionError::UnsupportedCommand).await.is_break()
                    }
                    Decision::Intercept(Intercept::Ping) => write_simple_failed(&mut writer, "PONG").await,
                    Decision::Intercept(Intercept::Quit) => {
                        let _ = write_simple_failed(&mut writer, "OK").await;
                        if !queue.is_empty() {
                            let _ = flush_batch(
                                &mut state,
                                &mut queue,
                                &mut writer,
                                &router,
                                transaction_timeout,
                                &metrics,
                            )
                            .await;
                        }
                        true
                    }
                    Decision::Intercept(Intercept::Select) => match frame.first_arg().map(|b| parse_decimal(b)) {
                        Some(Ok(n)) => {
                            state.database_id = n;
                            write_simple_failed(&mut writer, "OK").await
                        }
                        _ => report(&mut writer, &SessionError::BadArguments).await.is_break(),
                    },
                    Decision::TransactionAffecting(t) => {
                        state.transaction_mode = state.transaction_mode.apply(t);
                        queue.push(frame);
                        false
                    }
                    Decision::Forward => {
                        queue.push(frame);
                        false
                    }
                };

                if should_break {
                    break;
                }
            }
        }

        if queue.len() >= batch_cap {
            if let Err(e) =
                flush_batch(&mut state, &mut queue, &mut writer, &router, transaction_timeout, &metrics).await
            {
                if report(&mut writer, &e).await.is_break() {
                    break;
                }
            }
        }
    }
}

enum Flow {
    Continue,
    Break,
}

impl Flow {
    fn is_break(&self) -> bool {
        matches!(self, Flow::Break)
    }
}

/// Write the RESP error for `err` (if any) to the client and report whether
/// the session should terminate.
async fn report<W>(writer: &mut W, err: &SessionError) -> Flow
where
    W: AsyncWrite + Unpin + Send,
{
    if let Some(msg) = err.client_message() {
        let _ = reply::write_error(writer, msg).await;
        let _ = writer.flush().await;
    }
    if err.is_fatal() {
        Flow::Break
    } else {
        Flow::Continue
    }
}

/// Write a synthesized `+<s>\r\n` reply and flush; returns `true` (session
/// should terminate) if either write failed, since a broken client socket is
/// unrecoverable for the rest of the session.
async fn write_simple_failed<W>(writer: &mut W, s: &str) -> bool
where
    W: AsyncWrite + Unpin + Send,
{
    if reply::write_simple(writer, s).await.is_err() {
        return true;
    }
    writer.flush().await.is_err()
}

/// Run the flush routine (SPEC_FULL.md section 4.6) for the currently
/// queued commands. Always clears `queue`, whatever the outcome.
async fn flush_batch<W>(
    state: &mut State,
    queue: &mut Vec<CommandFrame>,
    writer: &mut W,
    router: &Arc<dyn BackendRouter>,
    transaction_timeout: Duration,
    metrics: &Arc<dyn Metrics>,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin + Send,
{
    if queue.is_empty() {
        return Ok(());
    }

    let pool = match &state.pinned_pool {
        Some(pool) => pool.clone(),
        None => router.route(&queue[0]),
    };

    let mut conn = if let Some(lease) = state.lease.clone() {
        match lease.take() {
            Some(conn) => conn,
            None => {
                queue.clear();
                state.lease = None;
                state.pinned_pool = None;
                state.done_tx = None;
                state.transaction_mode = TransactionMode::None;
                return Err(SessionError::TransactionTimeout);
            }
        }
    } else {
        match pool.checkout().await {
            Ok(conn) => conn,
            Err(e) => {
                queue.clear();
                return Err(e.into());
            }
        }
    };

    let result = write_and_copy(&mut conn, state.database_id, queue, writer, metrics).await;
    queue.clear();

    match result {
        Ok(()) => {
            if state.transaction_mode == TransactionMode::None {
                if let Some(done_tx) = state.done_tx.take() {
                    let _ = done_tx.send(());
                }
                state.lease = None;
                state.pinned_pool = None;
                pool.checkin(conn);
            } else if let Some(lease) = &state.lease {
                lease.put_back(conn);
            } else {
                let (done_tx, done_rx) = oneshot::channel();
                let lease = Lease::new(conn);
                spawn_timeout_watcher(lease.clone(), pool.clone(), transaction_timeout, done_rx, metrics.clone());
                state.lease = Some(lease);
                state.pinned_pool = Some(pool);
                state.done_tx = Some(done_tx);
            }
            Ok(())
        }
        Err(e) => {
            conn.disconnect();
            metrics.counter("disconnect");
            pool.checkin(conn);
            state.lease = None;
            state.pinned_pool = None;
            state.done_tx = None;
            state.transaction_mode = TransactionMode::None;
            Err(e)
        }
    }
}

/// Steps 3-6 of the flush routine against one already-leased connection.
async fn write_and_copy<W>(
    conn: &mut PooledConnection,
    database_id: u64,
    queue: &[CommandFrame],
    writer: &mut W,
    metrics: &Arc<dyn Metrics>,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin + Send,
{
    if conn.database_id() != database_id {
        conn.select_database(database_id).await.map_err(as_recoverable)?;
    }

    let started = Instant::now();
    for frame in queue {
        conn.write_frame(frame.as_bytes()).await.map_err(as_recoverable)?;
    }
    conn.flush().await.map_err(as_recoverable)?;
    metrics.timing("redis_write", started.elapsed());

    for _ in 0..queue.len() {
        conn.copy_reply_to(writer).await?;
    }
    writer.flush().await.map_err(SessionError::Io)?;
    Ok(())
}

/// Before any reply bytes have reached the client, an upstream I/O failure
/// only costs this batch, same as a failed checkout (spec section 7): remap
/// it to `BackendUnavailable` so `is_fatal` doesn't tear down the whole
/// session over a write the client never saw the effect of. Once
/// `copy_reply_to` starts streaming a reply back, the client stream may
/// already be mis-framed, so those errors (and the final writer flush) keep
/// their own, fatal, kind.
fn as_recoverable(err: SessionError) -> SessionError {
    match err {
        SessionError::Io(_) => SessionError::BackendUnavailable,
        other => other,
    }
}
