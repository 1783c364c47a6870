use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the process-wide tracing subscriber. Format is selected by
/// `LOG_FORMAT` (`json` or `pretty`, default `pretty`); verbosity by
/// `RUST_LOG`/`GITAUDIT_LOG`, falling back to a sane default rather than
/// the workspace's blanket `debug`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("GITAUDIT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("gitaudit=info,tower_http=info"));

    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    if json {
        fmt().with_env_filter(filter).json().with_current_span(true).init();
    } else {
        fmt().with_env_filter(filter).compact().init();
    }
}
