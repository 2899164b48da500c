use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "channel_progress=info";

/// Install the global fmt subscriber, honouring `RUST_LOG` when set.
///
/// Repeated calls are ignored.
pub fn init_tracing() {
    init_tracing_with_level(None);
}

/// Like [`init_tracing`], with `level` used for this crate when `RUST_LOG` is unset
pub fn init_tracing_with_level(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        Some(level) => EnvFilter::new(format!("channel_progress={}", level)),
        None => EnvFilter::new(DEFAULT_FILTER),
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
