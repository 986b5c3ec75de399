use tracing_subscriber::EnvFilter;

/// Initialize simple console-only logging for tests and examples.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("elrpc=debug")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
