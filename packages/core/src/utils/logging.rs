// Логирование
//
// The crate itself only emits `tracing` events under `crypto::*` targets.
// Hosts that do not install their own subscriber can call `init_tracing`.

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Calling it more than once, or after the host installed a subscriber, is a no-op.
#[cfg(feature = "logging")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        tracing::debug!(target: "crypto::test", "subscriber installed");
    }
}
