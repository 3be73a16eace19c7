//! Logging setup. Stdout carries the wire protocol, so all log output goes
//! to stderr.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber once at startup. `level` is a default
/// filter directive such as "info" or "debug"; `RUST_LOG` overrides it.
pub fn init(level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gradescaled={level}")));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(false)
            .with_line_number(false),
    );

    let _ = subscriber.try_init();
}
