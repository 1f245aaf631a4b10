use std::time::Duration;

/// Default port the proxy listens on for client connections.
pub const DEFAULT_PORT: u16 = 6380;

/// Maximum number of concurrent client connections the proxy will accept.
///
/// When this limit is reached, the accept loop stops taking new connections
/// until an active session terminates.
pub const MAX_CONNECTIONS: usize = 1024;

/// Capacity of the bounded channel between a session's reader task and its
/// worker task.
pub const READ_CHANNEL_CAPACITY: usize = 10_000;

/// Default number of idle upstream connections a single backend pool will
/// hold before `checkout` blocks.
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Default per-session transaction timeout, per spec section 6.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_millis(500);

/// Default per-I/O deadlines for upstream sockets.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on how long `checkout()` will wait for an idle connection.
pub const DEFAULT_POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on how many commands a session batches before flushing, when
/// multiplexing is off (multiplexing forces the cap to 1; see spec section
/// 4.6).
pub const DEFAULT_BATCH_CAP: usize = 32;
