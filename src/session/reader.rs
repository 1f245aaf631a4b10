//! Read loop (part of C6): scans complete commands out of the client socket
//! and hands them to the worker over a bounded channel.
//!
//! Grounded on `JasonkayZK-mini-redis/src/server/handler.rs`'s
//! `tokio::select!` between `connection.read_frame()` and the shutdown
//! signal, generalized from "parse one `Frame` at a time from a
//! `Connection`'s internal buffer" to "scan one `CommandFrame` at a time
//! from a growing `BytesMut`, fed by raw socket reads".

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use crate::resp::command_frame;
use crate::server::shutdown::Shutdown;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// One unit of work handed from the reader to the worker.
pub enum ReadItem {
    Frame(crate::resp::CommandFrame),
    /// Peer closed the socket, or the shutdown signal fired.
    Eof,
    /// The scanner hit malformed input; fatal for the session.
    Error(crate::error::ProtocolError),
}

/// Drive the read loop until EOF, a parse error, or shutdown. Terminal
/// conditions are always reported to `tx` (best-effort; if the worker has
/// already gone, the send is simply dropped).
pub async fn run<R>(mut reader: R, tx: mpsc::Sender<ReadItem>, mut shutdown: Shutdown)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY);

    loop {
        loop {
            match command_frame::scan(&mut buf) {
                Ok(Some(frame)) => {
                    if tx.send(ReadItem::Frame(frame)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(ReadItem::Error(e)).await;
                    return;
                }
            }
        }

        let read = tokio::select! {
            res = reader.read_buf(&mut buf) => res,
            _ = shutdown.recv() => {
                let _ = tx.send(ReadItem::Eof).await;
                return;
            }
        };

        match read {
            Ok(0) => {
                let _ = tx.send(ReadItem::Eof).await;
                return;
            }
            Ok(_) => continue,
            Err(_) => {
                let _ = tx.send(ReadItem::Eof).await;
                return;
            }
        }
    }
}
