//! The transport underneath an upstream connection: TCP or, on platforms
//! that support it, a Unix domain socket, driven through one shared
//! `AsyncRead`/`AsyncWrite` surface.
//!
//! Grounded on `JOT85-redis-rs/src/aio.rs`'s `ActualConnection` enum, which
//! implements `AsyncRead`/`AsyncWrite` by dispatching to whichever variant
//! is active. This proxy needs the same shape for the same reason: upstream
//! connections and the pool that creates them shouldn't care which
//! transport a given backend endpoint uses.

use std::io;
use std::pin::Pin;
use std::task::{self, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::error::PoolError;

/// Where to dial to reach a backend: a TCP socket address, or (on Unix) a
/// filesystem path to a Unix domain socket.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Tcp(String),
    #[cfg(unix)]
    Unix(String),
}

impl Endpoint {
    /// Parse `"host:port"` as TCP, or `"unix:/path/to/socket"` as a Unix
    /// domain socket path.
    pub fn parse(s: &str) -> Endpoint {
        #[cfg(unix)]
        if let Some(path) = s.strip_prefix("unix:") {
            return Endpoint::Unix(path.to_string());
        }
        Endpoint::Tcp(s.to_string())
    }
}

pub enum Socket {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Socket {
    /// Dial `endpoint`, bounded by `connect_timeout`.
    pub async fn connect(endpoint: &Endpoint, connect_timeout: Duration) -> Result<Socket, PoolError> {
        let fut = async {
            match endpoint {
                Endpoint::Tcp(addr) => TcpStream::connect(addr).await.map(Socket::Tcp),
                #[cfg(unix)]
                Endpoint::Unix(path) => UnixStream::connect(path).await.map(Socket::Unix),
            }
        };

        match tokio::time::timeout(connect_timeout, fut).await {
            Ok(Ok(socket)) => Ok(socket),
            Ok(Err(e)) => Err(PoolError::Io(e)),
            Err(_) => Err(PoolError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "connect timed out",
            ))),
        }
    }
}

impl AsyncRead for Socket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Socket::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Socket {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Socket::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Socket::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Socket::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
