//! Logging setup: journald on Linux, otherwise a daily rolling file.
//!
//! Level comes from `LOSTDOGS_LOG` (an `EnvFilter` directive such as
//! `debug` or `lostdogs::outbox=trace`), defaulting to `info`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "LOSTDOGS_LOG";

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Call once at startup.
///
/// With `log_dir` unset and no journald, logs go to stderr.
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(journald) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(filter())
                .with(journald.with_syslog_identifier("lostdogs".to_string()))
                .try_init()
                .context("Failed to install journald subscriber")?;
            tracing::info!("Logging initialized with journald backend");
            return Ok(());
        }
    }

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(filter())
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .context("Failed to install stderr subscriber")?;
        return Ok(());
    };

    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log dir {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::daily(&log_dir, "lostdogs.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("Failed to install file subscriber")?;

    tracing::info!(dir = %log_dir.display(), "Logging initialized with file backend");
    Ok(())
}

/// Stderr-only logging for short-lived tools.
pub fn init_stderr() {
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
