//! Tracing bootstrap shared by the `api` and `worker` binaries.

use std::path::Path;

use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;

/// Installs the global tracing subscriber.
///
/// Events are written to a daily-rolling file under `logs/` and, when
/// `log_to_stdout` is set, mirrored to stdout with ANSI colours. The filter comes
/// from `RUST_LOG` if set, otherwise from the configured `log_level`.
///
/// Keep the returned guard alive for the lifetime of the process, dropping it
/// flushes and stops the background file writer.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let dir = Path::new("logs");
    std::fs::create_dir_all(dir).ok();

    let file_appender = rolling::daily(dir, &config.log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let stdout_layer = config.log_to_stdout.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(true)
    });

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    guard
}
