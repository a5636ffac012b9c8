//! Structured Logger
//!
//! Wraps `tracing` with environment-based level control, a console layer and,
//! when a directory is given, a daily-rotated JSON file layer.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the file writer flushing; hold it for the lifetime of the process.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize the global logger. `RUST_LOG` takes precedence over `level`.
///
/// Calling it twice is harmless: the second registry is simply not installed.
pub fn init_logger(level: &str, log_dir: Option<&Path>) -> LogGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(true);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            // Rolling file appender: writes NDJSON to `apibot.log.YYYY-MM-DD`
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "apibot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    LogGuard { _file: guard }
}
