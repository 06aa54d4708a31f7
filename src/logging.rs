//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable holding per-target log directives.
pub const LOG_ENV: &str = "ROWSIFT_LOG";

/// Levels accepted by [`init`] and the `log_level` config field.
pub const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Initialize logging to stderr.
///
/// Reads `ROWSIFT_LOG` (e.g. `ROWSIFT_LOG=rowsift::engine=debug`), falling
/// back to `rowsift=<level>`. Calling this more than once is a no-op.
pub fn init(level: &str, json: bool) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(format!("rowsift={}", level.to_lowercase())));

        let registry = tracing_subscriber::registry().with(filter);
        // Another subscriber (e.g. a test harness) may already be installed.
        let _ = if json {
            registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()
        };
    });
}
