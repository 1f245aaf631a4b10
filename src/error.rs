use std::io;

use thiserror::Error;

/// Error encountered while parsing RESP bytes, on either the client or the
/// upstream side of the proxy.
///
/// Only `Incomplete` is handled at runtime, by asking for more bytes. Every
/// other variant is fatal for the stream it was raised on.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("protocol error; {0}")]
    Parse(String),

    /// The scanner reached the end of the buffered bytes without completing
    /// a frame. Not fatal: the caller should read more and retry.
    #[error("not enough data is available to parse a frame")]
    Incomplete,

    #[error(transparent)]
    ParseInt(#[from] std::num::TryFromIntError),

    #[error(transparent)]
    ParseUtf8(#[from] std::string::FromUtf8Error),
}

/// Errors raised while leasing or dialing an upstream connection.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("connection down")]
    BackendUnavailable,

    #[error("timed out waiting for an idle upstream connection")]
    AcquireTimeout,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Every error kind a client session can surface, matching spec section 7
/// bit-for-bit. The RESP message returned to the client and whether the
/// session survives are encoded in `client_message` / `is_fatal`.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("protocol error")]
    Protocol(#[from] ProtocolError),

    #[error("unsupported command")]
    UnsupportedCommand,

    #[error("bad arguments")]
    BadArguments,

    #[error("connection down")]
    BackendUnavailable,

    #[error("transaction timeout")]
    TransactionTimeout,

    /// The client closed its side of the connection. Nothing to write back;
    /// raised only to flow the EOF case through the same
    /// report/`is_fatal` path every other session-ending error takes.
    #[error("client gone")]
    ClientGone,

    /// Raised only once a reply may already be mid-flight to the client
    /// (`session::worker::write_and_copy`'s copy phase, or its final writer
    /// flush); a failure writing the *next* batch upstream is remapped to
    /// `BackendUnavailable` before it ever becomes this variant, since the
    /// client hasn't seen any of that batch's effect yet.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SessionError {
    /// The RESP error line to write back to the client, if any. `ClientGone`
    /// has no client left to write to.
    pub fn client_message(&self) -> Option<&'static str> {
        match self {
            SessionError::Protocol(_) => Some("ERR protocol error"),
            SessionError::UnsupportedCommand => Some("ERR unsupported command"),
            SessionError::BadArguments => Some("ERR bad arguments"),
            SessionError::BackendUnavailable => Some("ERR connection down"),
            SessionError::TransactionTimeout => Some("ERR transaction timeout"),
            SessionError::Io(_) => Some("ERR protocol error"),
            SessionError::ClientGone => None,
        }
    }

    /// Whether this error ends the whole session, as opposed to just the
    /// offending command/batch.
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::UnsupportedCommand | SessionError::BadArguments => false,
            SessionError::BackendUnavailable => false,
            SessionError::Protocol(_)
            | SessionError::TransactionTimeout
            | SessionError::ClientGone
            | SessionError::Io(_) => true,
        }
    }
}

impl From<PoolError> for SessionError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::BackendUnavailable | PoolError::AcquireTimeout => {
                SessionError::BackendUnavailable
            }
            PoolError::Io(e) => SessionError::Io(e),
        }
    }
}
