use crate::config::LoggingSettings;
use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Console plus daily-rolling JSON file logging. `RUST_LOG` overrides the
/// configured default filter.
pub fn init_tracing(settings: &LoggingSettings) -> Result<()> {
    std::fs::create_dir_all(&settings.directory).with_context(|| {
        format!(
            "failed to create log directory {}",
            settings.directory.display()
        )
    })?;

    let file_appender =
        tracing_appender::rolling::daily(&settings.directory, &settings.file_prefix);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .compact();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .json()
        .with_current_span(false)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.default_filter)),
        )
        .try_init()
        .context("tracing subscriber already installed")?;

    // The writer flushes on drop; keep it for the life of the process.
    std::mem::forget(guard);

    Ok(())
}

/// Console-only logging for short-lived tools.
pub fn init_console_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init();
}
