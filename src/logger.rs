//! Logging bootstrap for the proxy binary.
//!
//! The rest of the crate only ever depends on the `log` facade macros
//! (`log::info!`, `debug!`, `error!`, ...); this module is the one place
//! that installs a concrete backend, so the library half of the crate stays
//! logger-implementation-agnostic.

/// Initialize the global logger from the `RUST_LOG` environment variable,
/// defaulting to `info` when it isn't set.
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
