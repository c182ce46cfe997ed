use tracing_subscriber::EnvFilter;

/// Default filter keeps onnxruntime's own chatter at warn.
const DEFAULT_FILTER: &str = "info,ort=warn";

pub fn init() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_ansi(false);
    // A subscriber may already be installed when embedded or under test.
    let _ = fmt.try_init();
}
