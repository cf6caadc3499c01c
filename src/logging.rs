//! Tracing subscriber setup.

use crate::config::LoggingConfig;
use crate::error::{DevLinkError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber: stderr output plus, if `log_dir` is set,
/// a daily-rotated file. `RUST_LOG` takes precedence over `config.filter`.
///
/// Keep the returned guard alive for the life of the program; dropping it
/// flushes and stops the file writer.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| DevLinkError::Config(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    let guard = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .try_init()
                .map_err(|e| DevLinkError::Config(format!("Logging already initialized: {}", e)))?;
            Some(guard)
        }
        None => {
            registry
                .try_init()
                .map_err(|e| DevLinkError::Config(format!("Logging already initialized: {}", e)))?;
            None
        }
    };

    tracing::debug!(filter = %config.filter, file = ?config.log_dir, "logging initialized");
    Ok(guard)
}
