//! `tracing` subscriber installation.

use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, LogSettings};

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Installing twice is
/// not an error: the first subscriber stays in place.
pub fn init(settings: &LogSettings) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level).map_err(|err| {
            ConfigError::Invalid(format!("log level '{}': {err}", settings.level))
        })?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if settings.json {
        builder.json().try_init()
    } else {
        builder.with_ansi(false).try_init()
    };
    Ok(())
}
