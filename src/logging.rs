use crate::config::{ConfigStore, keys};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Prefix of the daily log files
pub const LOG_FILE_PREFIX: &str = "fscan";

/// Default log directory, relative to the application directory
pub const DEFAULT_LOG_SUBDIR: &str = "logs";

/// Where and how to log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub log_dir: Utf8PathBuf,
    pub debug: bool,
    pub json: bool,
}

impl LogSettings {
    /// Read `LOG_DIR`, `DEBUG`, and `LOG_JSON`. A relative `LOG_DIR` resolves
    /// against the application directory.
    pub fn from_config(config: &ConfigStore) -> Self {
        let log_dir = config
            .get(keys::LOG_DIR)
            .filter(|dir| !dir.trim().is_empty())
            .map(|dir| Utf8PathBuf::from(dir.trim()))
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_LOG_SUBDIR));
        let log_dir = if log_dir.is_absolute() {
            log_dir
        } else {
            config.base_dir().join(log_dir)
        };

        Self {
            log_dir,
            debug: config.get_flag(keys::DEBUG),
            json: config.get_flag(keys::LOG_JSON),
        }
    }

    /// `RUST_LOG` when set, otherwise debug or info depending on `debug`
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if self.debug {
                EnvFilter::new("debug")
            } else {
                EnvFilter::new("info")
            }
        })
    }
}

fn ensure_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}

/// Setup logging with a daily rotating file and colored console output on stderr.
///
/// The file layer is plain text, or one JSON object per line when
/// `settings.json` is set.
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(settings: &LogSettings) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    ensure_log_dir(&settings.log_dir)?;

    let file_appender = rolling::daily(&settings.log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let text_layer = (!settings.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking.clone())
            .with_ansi(false) // No ANSI codes in log files
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
    });
    let json_layer = settings.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking.clone())
            .with_thread_names(true)
            .with_current_span(false)
    });

    // stdout belongs to the console front-end
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false);

    tracing_subscriber::registry()
        .with(settings.env_filter())
        .with(text_layer)
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, debug={}, json={}",
        settings.log_dir,
        settings.debug,
        settings.json
    );

    Ok(guard)
}
