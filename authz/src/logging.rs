use tracing_subscriber::{
    fmt::{self, time::OffsetTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;
use crate::error::{AuthzError, Result};

/// Install a console subscriber for hosts that do not bring their own.
///
/// `RUST_LOG` wins over the configured filter. Returns an error instead of
/// panicking when a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    // Local time can be unavailable in multi-threaded processes
    let timer = OffsetTime::local_rfc_3339().unwrap_or_else(|_| {
        OffsetTime::new(
            time::UtcOffset::UTC,
            time::format_description::well_known::Rfc3339,
        )
    });

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| {
            AuthzError::Configuration(format!("Invalid log filter '{}': {}", config.filter, e))
        })?,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_timer(timer)
                .with_target(config.with_target)
                .with_ansi(config.ansi)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .with(filter)
        .try_init()
        .map_err(|e| AuthzError::Configuration(format!("Failed to install subscriber: {}", e)))?;

    tracing::info!("Authorization logging initialized");
    Ok(())
}
