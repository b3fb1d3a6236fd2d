// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Unified logging initialization for ShortBus
//!
//! Console output always; with the `file-logging` feature, a timestamped run
//! folder with a daily-rolling JSON log and retention of the most recent runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingOptions};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Logging initialization result
///
/// Keep it alive for the life of the process; dropping it flushes file writers.
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
    installed: bool,
}

impl LoggingGuard {
    /// Run folder being written to, if file logging is on
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    /// False when another global subscriber was already installed
    pub fn installed(&self) -> bool {
        self.installed
    }
}

/// Initialize logging
///
/// Safe to call more than once: if a global subscriber is already installed
/// the existing one is kept and the returned guard reports `installed() == false`.
///
/// # Errors
///
/// Invalid filter directives, or a log directory that cannot be created.
pub fn init_logging(options: &LoggingOptions) -> Result<LoggingGuard> {
    let directives = options.filter_directives();
    // Validate once; EnvFilter is not Clone, so each layer builds its own
    EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter: {}", directives))?;
    let filter = || EnvFilter::new(&directives);

    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console_layer = match options.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .with_filter(filter())
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_filter(filter())
            .boxed(),
    };
    layers.push(console_layer);

    #[cfg(feature = "file-logging")]
    let (file_guards, log_dir) = if options.file_logging {
        let (layer, guard, run_folder) = file_layer(options, filter())?;
        layers.push(layer);
        (vec![guard], Some(run_folder))
    } else {
        (Vec::new(), None)
    };

    #[cfg(not(feature = "file-logging"))]
    let log_dir: Option<PathBuf> = None;

    let installed = Registry::default().with(layers).try_init().is_ok();

    #[cfg(not(feature = "file-logging"))]
    if options.file_logging {
        tracing::warn!("File logging requested but the file-logging feature is not enabled");
    }

    Ok(LoggingGuard {
        #[cfg(feature = "file-logging")]
        _file_guards: file_guards,
        log_dir,
        installed,
    })
}

/// Initialize logging with default settings and the process's debug flags
pub fn init_logging_default() -> Result<LoggingGuard> {
    let options = LoggingOptions::default().with_debug_flags(crate::cli::parse_debug_flags());
    init_logging(&options)
}

#[cfg(feature = "file-logging")]
fn file_layer(
    options: &LoggingOptions,
    filter: EnvFilter,
) -> Result<(BoxedLayer, tracing_appender::non_blocking::WorkerGuard, PathBuf)> {
    use tracing_appender::rolling;

    // Timestamped run folder: ./logs/run_20250101_120000/
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let run_folder = options.log_dir.join(format!("run_{}", timestamp));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;

    cleanup_old_runs(&options.log_dir, &run_folder, options.retention_runs)?;

    let appender = rolling::daily(&run_folder, "shortbus.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_filter(filter)
        .boxed();

    Ok((layer, guard, run_folder))
}

/// Remove all but the `retention_runs` most recent run folders
#[cfg(feature = "file-logging")]
fn cleanup_old_runs(base_log_dir: &Path, current: &Path, retention_runs: usize) -> Result<()> {
    let mut runs: Vec<PathBuf> = std::fs::read_dir(base_log_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.starts_with("run_"))
        })
        .collect();

    // run_YYYYmmdd_HHMMSS sorts chronologically by name
    runs.sort();
    let excess = runs.len().saturating_sub(retention_runs.max(1));
    for path in runs.iter().take(excess) {
        if path == current {
            continue;
        }
        if let Err(e) = std::fs::remove_dir_all(path) {
            eprintln!("Warning: Failed to remove old log directory {}: {}", path.display(), e);
        }
    }

    Ok(())
}
