//! Static command denylists (spec section 4.2). Kept as plain `static`
//! slices, the same texture as the constants in `consts.rs`, so the set is
//! reproducible bit-for-bit and trivially auditable.

/// Commands that require single-client semantics the proxy cannot uphold on
/// a shared upstream connection, regardless of multiplexing.
static UNSUPPORTED_ALWAYS: &[&str] = &[
    "subscribe",
    "psubscribe",
    "unsubscribe",
    "punsubscribe",
    "monitor",
    "wait",
    "cluster",
    "blpop",
    "brpop",
    "brpoplpush",
    "blmove",
    "blmpop",
    "bzpopmin",
    "bzpopmax",
    "bzmpop",
    "xread",
    "xreadgroup",
];

/// Commands that touch multiple keys or the whole keyspace, and so cannot
/// be routed to a single shard when multiplexing is enabled.
static UNSUPPORTED_WHEN_MULTIPLEXING: &[&str] = &[
    "mget", "mset", "msetnx", "del", "unlink", "exists", "touch", "keys", "scan", "flushdb",
    "flushall", "rename", "renamenx", "randomkey", "swapdb",
];

pub fn is_denylisted(name: &str) -> bool {
    UNSUPPORTED_ALWAYS.contains(&name)
}

pub fn is_multi_key(name: &str) -> bool {
    UNSUPPORTED_WHEN_MULTIPLEXING.contains(&name)
}
