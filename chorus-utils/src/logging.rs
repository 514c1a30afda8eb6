//! Structured logging initialization via `tracing`.

/// Initialize the tracing subscriber with sensible defaults.
///
/// Checks `RUST_LOG` first, then falls back to `CHORUS_LOG_LEVEL`.
/// If neither is set, defaults to `info`. Safe to call more than once (e.g.
/// once per `Server` constructed in a process) — a subscriber already
/// installed by an embedding application, or by an earlier call, is left in
/// place rather than panicking.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if let Ok(level) = std::env::var("CHORUS_LOG_LEVEL") {
        EnvFilter::new(level)
    } else {
        EnvFilter::new("info")
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
