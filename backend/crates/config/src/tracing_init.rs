use tracing_subscriber::{fmt, EnvFilter};

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (usually `AppConfig::log_level`)
/// is used. A malformed directive falls back to `info`.
pub fn init_tracing(level: &str) {
    fmt()
        .with_env_filter(build_filter(level))
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ENV_LOCK;

    #[test]
    fn uses_configured_level_without_rust_log() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        std::env::remove_var("RUST_LOG");

        let filter = build_filter("opsdash_sync=debug,warn");
        let rendered = filter.to_string();
        assert!(rendered.contains("opsdash_sync=debug"), "got: {rendered}");
    }

    #[test]
    fn rust_log_overrides_configured_level() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        std::env::set_var("RUST_LOG", "error");

        let rendered = build_filter("debug").to_string();
        assert!(rendered.contains("error"), "got: {rendered}");
        assert!(!rendered.contains("debug"), "got: {rendered}");

        std::env::remove_var("RUST_LOG");
    }
}
