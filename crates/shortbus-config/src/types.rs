// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `shortbus.toml`. Every field has a default, so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShortBusConfig {
    pub node: NodeConfig,
    pub transport: ZmqTransportConfig,
    pub logging: LoggingConfig,
}

/// Identity of this process on the bus
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Overrides the detected machine name; empty = detect
    pub machine_name: String,
    /// Port the node receives on; 0 = allocate an ephemeral port
    pub receive_port: u16,
    /// First path segment of the receive address
    pub process_name: String,
    /// Machine hosting the subscription service; empty = none configured
    pub subscription_service_host: String,
    pub subscription_service_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            machine_name: String::new(),
            receive_port: 0,
            process_name: "shortbus".to_string(),
            subscription_service_host: String::new(),
            subscription_service_port: 50000,
        }
    }
}

impl NodeConfig {
    pub fn machine_name(&self) -> Option<&str> {
        non_empty(&self.machine_name)
    }

    pub fn receive_port(&self) -> Option<u16> {
        (self.receive_port != 0).then_some(self.receive_port)
    }

    pub fn subscription_service_host(&self) -> Option<&str> {
        non_empty(&self.subscription_service_host)
    }
}

/// ZMQ socket and queue tuning (all durations in milliseconds)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ZmqTransportConfig {
    pub poll_timeout_ms: u64,
    pub handoff_capacity: usize,
    pub min_frame_size: usize,
    pub receive_buffer_bytes: i32,
    pub send_buffer_bytes: i32,
    /// Negative = block until the peer takes the frame
    pub send_timeout_ms: i64,
    pub linger_ms: u64,
    /// 0 = unlimited
    pub max_message_size: usize,
    pub inbound_shutdown_timeout_ms: u64,
    pub outbound_shutdown_timeout_ms: u64,
    pub ephemeral_port_start: u16,
    pub ephemeral_port_end: u16,
    pub port_probe_attempts: u32,
}

impl Default for ZmqTransportConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 250,
            handoff_capacity: 10_000,
            min_frame_size: 20,
            receive_buffer_bytes: 10 * 1024 * 1024,
            send_buffer_bytes: 10 * 1024 * 1024,
            send_timeout_ms: 5_000,
            linger_ms: 0,
            max_message_size: 10 * 1024 * 1024,
            inbound_shutdown_timeout_ms: 1_000,
            outbound_shutdown_timeout_ms: 10_000,
            ephemeral_port_start: 10000,
            ephemeral_port_end: 20000,
            port_probe_attempts: 1000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// text or json
    pub format: String,
    pub directory: PathBuf,
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            directory: PathBuf::from("./logs"),
            file_logging: false,
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}
