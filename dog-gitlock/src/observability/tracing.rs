//! Subscriber setup for binaries embedding the lock manager.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the application unless it opts into `tracing-basic`.

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,dog_gitlock=info";

/// Install a global fmt subscriber honouring `RUST_LOG`.
///
/// Returns false if a global subscriber was already set.
#[cfg(feature = "tracing-basic")]
pub fn init_tracing(json: bool) -> bool {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = fmt().with_env_filter(filter).with_target(true);

    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
