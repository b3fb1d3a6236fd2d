// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! This module provides validation logic to ensure configuration values are
//! consistent, within valid ranges, and don't conflict with each other.

use crate::{ConfigError, ConfigResult, ShortBusConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["text", "json"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    InvalidPortRange { port_name: String, port: u16 },
    PortConflict { port1: String, port2: String, port: u16 },
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPortRange { port_name, port } => {
                write!(
                    f,
                    "Port {} = {} is outside valid range (1024-65535)",
                    port_name, port
                )
            }
            Self::PortConflict { port1, port2, port } => {
                write!(
                    f,
                    "Port conflict: {} and {} both use port {}",
                    port1, port2, port
                )
            }
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - Port ranges (1024-65535, receive port may be 0 for "allocate")
/// - Port conflicts between the receive port and the subscription service
/// - Required fields
/// - Valid value ranges
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &ShortBusConfig) -> ConfigResult<()> {
    let errors = collect_errors(config);
    if errors.is_empty() {
        return Ok(());
    }

    let error_messages = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::ValidationError(format!(
        "Configuration validation failed:\n{}",
        error_messages
    )))
}

/// Every validation problem in `config`, in check order
pub fn collect_errors(config: &ShortBusConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();
    validate_port_ranges(config, &mut errors);
    validate_port_conflicts(config, &mut errors);
    validate_required_fields(config, &mut errors);
    validate_value_ranges(config, &mut errors);
    errors
}

fn validate_port_ranges(config: &ShortBusConfig, errors: &mut Vec<ConfigValidationError>) {
    let node = &config.node;
    if node.receive_port != 0 && node.receive_port < 1024 {
        errors.push(ConfigValidationError::InvalidPortRange {
            port_name: "node.receive_port".to_string(),
            port: node.receive_port,
        });
    }
    if node.subscription_service_port < 1024 {
        errors.push(ConfigValidationError::InvalidPortRange {
            port_name: "node.subscription_service_port".to_string(),
            port: node.subscription_service_port,
        });
    }

    let transport = &config.transport;
    if transport.ephemeral_port_start < 1024 {
        errors.push(ConfigValidationError::InvalidPortRange {
            port_name: "transport.ephemeral_port_start".to_string(),
            port: transport.ephemeral_port_start,
        });
    }
    if transport.ephemeral_port_start >= transport.ephemeral_port_end {
        errors.push(ConfigValidationError::InvalidValue {
            field: "transport.ephemeral_port_end".to_string(),
            reason: format!(
                "range {}..{} is empty",
                transport.ephemeral_port_start, transport.ephemeral_port_end
            ),
        });
    }
}

fn validate_port_conflicts(config: &ShortBusConfig, errors: &mut Vec<ConfigValidationError>) {
    let node = &config.node;
    // Only a conflict when the subscription service runs on this node
    let service_is_here = match (node.subscription_service_host(), node.machine_name()) {
        (Some(service), Some(machine)) => service.eq_ignore_ascii_case(machine),
        (Some(service), None) => service.eq_ignore_ascii_case("Current"),
        (None, _) => false,
    };

    if service_is_here && node.receive_port == node.subscription_service_port {
        errors.push(ConfigValidationError::PortConflict {
            port1: "node.receive_port".to_string(),
            port2: "node.subscription_service_port".to_string(),
            port: node.receive_port,
        });
    }
}

fn validate_required_fields(config: &ShortBusConfig, errors: &mut Vec<ConfigValidationError>) {
    let process_name = config.node.process_name.trim();
    if process_name.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "node.process_name".to_string(),
        });
    } else if process_name.contains('/') {
        errors.push(ConfigValidationError::InvalidValue {
            field: "node.process_name".to_string(),
            reason: "must be a single path segment".to_string(),
        });
    }
}

fn validate_value_ranges(config: &ShortBusConfig, errors: &mut Vec<ConfigValidationError>) {
    let transport = &config.transport;
    if transport.poll_timeout_ms == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "transport.poll_timeout_ms".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    if transport.handoff_capacity == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "transport.handoff_capacity".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    if transport.max_message_size != 0 && transport.max_message_size < 20 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "transport.max_message_size".to_string(),
            reason: "must be 0 (unlimited) or at least 20 bytes".to_string(),
        });
    }
    if transport.port_probe_attempts == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "transport.port_probe_attempts".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    if transport.receive_buffer_bytes < 0 || transport.send_buffer_bytes < 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "transport.*_buffer_bytes".to_string(),
            reason: "must not be negative".to_string(),
        });
    }

    let logging = &config.logging;
    if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("'{}' is not one of {:?}", logging.level, LOG_LEVELS),
        });
    }
    if !LOG_FORMATS.contains(&logging.format.to_lowercase().as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.format".to_string(),
            reason: format!("'{}' is not one of {:?}", logging.format, LOG_FORMATS),
        });
    }
}
