use tracing_subscriber::EnvFilter;

/// Log to stderr; stdout is reserved for JSON output.
///
/// `RUST_LOG` wins when set. Otherwise only warnings are shown, or per-call detail
/// with `verbose`.
pub fn configure_logging(verbose: bool) {
    let default = if verbose {
        "serpsim=debug,serpsim_local=debug,warn"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
