// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # shortbus-observability
//!
//! Logging setup shared by every ShortBus crate, with per-crate debug flag
//! support.
//!
//! ## Features
//! - `file-logging`: rolling JSON log files in per-run folders

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

// Re-export commonly used items
pub use cli::*;
pub use config::*;
pub use init::*;

/// Known ShortBus crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "shortbus",
    "shortbus-transports",
    "shortbus-config",
    "shortbus-observability",
];
