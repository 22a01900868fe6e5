//! Structured logging setup.
//!
//! Logs go straight to stdout and, per `AppConfig::log_rotation`, to a
//! rotating file via `tracing-appender`.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{AppConfig, LogRotation};

/// Must be kept alive for the lifetime of the process - dropping it stops
/// the background thread that flushes buffered log lines to the file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the global tracing subscriber: an `EnvFilter` seeded from
/// `config.log_level` (overridable via `RUST_LOG`), a human-readable stdout
/// layer, and an optional rotating file layer.
pub fn init(config: &AppConfig) -> LoggingGuard {
    let default_filter = format!("reasoning_proxy={level},tower_http=debug,axum=debug", level = config.log_level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stdout_layer = fmt::layer().with_target(true).with_level(true);

    let (file_layer, guard) = match config.log_rotation {
        LogRotation::Never => (None, None),
        rotation => {
            let _ = std::fs::create_dir_all(&config.log_dir);
            let rolling = match rotation {
                LogRotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
                LogRotation::Daily => tracing_appender::rolling::Rotation::DAILY,
                LogRotation::Never => unreachable!("handled above"),
            };
            let appender = tracing_appender::rolling::RollingFileAppender::new(
                rolling,
                &config.log_dir,
                "reasoning-proxy.log",
            );
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    LoggingGuard { _file_guard: guard }
}
