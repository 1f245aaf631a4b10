//! Fire-and-forget observability hooks consumed by the rest of the crate.
//!
//! Section 6 of the spec asks for a `counter(name)` / `timing(name,
//! duration)` pair and treats the sink as an ambient dependency, not core
//! logic: the core never blocks, retries, or fails because of it.

use std::time::Duration;

/// A fire-and-forget metrics sink. Implementations must not block or panic;
/// callers do not check for success.
pub trait Metrics: Send + Sync {
    fn counter(&self, name: &str);

    fn timing(&self, name: &str, duration: Duration);
}

/// Discards everything. Used when the host process hasn't wired in a real
/// sink, so the core never has a hard dependency on one.
#[derive(Debug, Default)]
pub struct NopMetrics;

impl Metrics for NopMetrics {
    fn counter(&self, _name: &str) {}

    fn timing(&self, _name: &str, _duration: Duration) {}
}

/// Routes counters and timings through the `log` facade at debug level.
/// Handy for local runs and tests where a metrics backend isn't worth
/// standing up.
#[derive(Debug, Default)]
pub struct LoggingMetrics;

impl Metrics for LoggingMetrics {
    fn counter(&self, name: &str) {
        log::debug!("metric counter {} += 1", name);
    }

    fn timing(&self, name: &str, duration: Duration) {
        log::debug!("metric timing {} = {:?}", name, duration);
    }
}
