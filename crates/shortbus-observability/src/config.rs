//! Logging configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::cli::CrateDebugFlags;

/// Log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Everything `init_logging` needs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Default level (trace, debug, info, warn, error)
    pub level: String,

    pub format: LogFormat,

    /// Also write rolling daily files (requires the `file-logging` feature)
    pub file_logging: bool,

    /// Base directory for run folders
    pub log_dir: PathBuf,

    /// Keep N most recent run folders
    pub retention_runs: usize,

    /// Per-crate debug overrides
    #[serde(skip)]
    pub debug_flags: CrateDebugFlags,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        LoggingOptions {
            level: "info".to_string(),
            format: LogFormat::Text,
            file_logging: false,
            log_dir: PathBuf::from("./logs"),
            retention_runs: 10,
            debug_flags: CrateDebugFlags::default(),
        }
    }
}

impl LoggingOptions {
    pub fn with_debug_flags(mut self, debug_flags: CrateDebugFlags) -> Self {
        self.debug_flags = debug_flags;
        self
    }

    /// `EnvFilter` directives: per-crate debug overrides, then the default level
    pub fn filter_directives(&self) -> String {
        self.debug_flags.to_filter_string(&self.level.to_lowercase())
    }
}
