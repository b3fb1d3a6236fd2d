// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{validate_config, ConfigError, ConfigResult, ShortBusConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name searched for when no path is given
pub const CONFIG_FILE_NAME: &str = "shortbus.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SHORTBUS_CONFIG_PATH";

/// Find the ShortBus configuration file
///
/// Search order:
/// 1. `SHORTBUS_CONFIG_PATH` environment variable
/// 2. Current working directory: `./shortbus.toml`
/// 3. Parent directories (up to 5 levels)
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    // 1. Check environment variable first
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    // 2. Search upwards from the working directory
    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd;
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent.to_path_buf();
                }
                None => break,
            }
        }
    }

    if let Some(path) = search_paths.iter().find(|p| p.exists()) {
        return Ok(path.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found, contains invalid TOML, or fails validation
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<ShortBusConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let config: ShortBusConfig = toml::from_str(&content)?;

    finish(config, cli_args)
}

/// Like [`load_config`], but starts from defaults when no file is found
///
/// A file that exists but does not parse is still an error.
pub fn load_config_or_default(
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<ShortBusConfig> {
    match find_config_file() {
        Ok(path) => load_config(Some(&path), cli_args),
        Err(ConfigError::FileNotFound(_)) => finish(ShortBusConfig::default(), cli_args),
        Err(e) => Err(e),
    }
}

fn finish(
    mut config: ShortBusConfig,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<ShortBusConfig> {
    // Apply overrides in order
    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    validate_config(&config)?;
    Ok(config)
}

fn set_parsed<T: FromStr>(target: &mut T, value: &str) {
    if let Ok(parsed) = value.trim().parse::<T>() {
        *target = parsed;
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `SHORTBUS_MACHINE_NAME` -> `node.machine_name`
/// - `SHORTBUS_RECEIVE_PORT` -> `node.receive_port`
/// - `SHORTBUS_PROCESS_NAME` -> `node.process_name`
/// - `SHORTBUS_SUBSCRIPTION_HOST` -> `node.subscription_service_host`
/// - `SHORTBUS_SUBSCRIPTION_PORT` -> `node.subscription_service_port`
/// - `SHORTBUS_POLL_TIMEOUT_MS` -> `transport.poll_timeout_ms`
/// - `SHORTBUS_HANDOFF_CAPACITY` -> `transport.handoff_capacity`
/// - `SHORTBUS_SEND_TIMEOUT_MS` -> `transport.send_timeout_ms`
/// - `SHORTBUS_MAX_MESSAGE_SIZE` -> `transport.max_message_size`
/// - `SHORTBUS_LOG_LEVEL` -> `logging.level`
/// - `SHORTBUS_LOG_FORMAT` -> `logging.format`
/// - `SHORTBUS_LOG_DIR` -> `logging.directory`
/// - `SHORTBUS_FILE_LOGGING` -> `logging.file_logging`
pub fn apply_environment_overrides(config: &mut ShortBusConfig) {
    // Node settings
    if let Ok(value) = env::var("SHORTBUS_MACHINE_NAME") {
        config.node.machine_name = value;
    }
    if let Ok(value) = env::var("SHORTBUS_RECEIVE_PORT") {
        set_parsed(&mut config.node.receive_port, &value);
    }
    if let Ok(value) = env::var("SHORTBUS_PROCESS_NAME") {
        config.node.process_name = value;
    }
    if let Ok(value) = env::var("SHORTBUS_SUBSCRIPTION_HOST") {
        config.node.subscription_service_host = value;
    }
    if let Ok(value) = env::var("SHORTBUS_SUBSCRIPTION_PORT") {
        set_parsed(&mut config.node.subscription_service_port, &value);
    }

    // Transport settings
    if let Ok(value) = env::var("SHORTBUS_POLL_TIMEOUT_MS") {
        set_parsed(&mut config.transport.poll_timeout_ms, &value);
    }
    if let Ok(value) = env::var("SHORTBUS_HANDOFF_CAPACITY") {
        set_parsed(&mut config.transport.handoff_capacity, &value);
    }
    if let Ok(value) = env::var("SHORTBUS_SEND_TIMEOUT_MS") {
        set_parsed(&mut config.transport.send_timeout_ms, &value);
    }
    if let Ok(value) = env::var("SHORTBUS_MAX_MESSAGE_SIZE") {
        set_parsed(&mut config.transport.max_message_size, &value);
    }

    // Logging settings
    if let Ok(value) = env::var("SHORTBUS_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Ok(value) = env::var("SHORTBUS_LOG_FORMAT") {
        config.logging.format = value;
    }
    if let Ok(value) = env::var("SHORTBUS_LOG_DIR") {
        config.logging.directory = PathBuf::from(value);
    }
    if let Ok(value) = env::var("SHORTBUS_FILE_LOGGING") {
        config.logging.file_logging = parse_flag(&value);
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"machine_name": "node-a", "receive_port": "5005"}`)
pub fn apply_cli_overrides(config: &mut ShortBusConfig, cli_args: &HashMap<String, String>) {
    // Node settings
    if let Some(value) = cli_args.get("machine_name") {
        config.node.machine_name = value.clone();
    }
    if let Some(value) = cli_args.get("receive_port") {
        set_parsed(&mut config.node.receive_port, value);
    }
    if let Some(value) = cli_args.get("process_name") {
        config.node.process_name = value.clone();
    }
    if let Some(value) = cli_args.get("subscription_host") {
        config.node.subscription_service_host = value.clone();
    }
    if let Some(value) = cli_args.get("subscription_port") {
        set_parsed(&mut config.node.subscription_service_port, value);
    }

    // Transport settings
    if let Some(value) = cli_args.get("poll_timeout_ms") {
        set_parsed(&mut config.transport.poll_timeout_ms, value);
    }
    if let Some(value) = cli_args.get("send_timeout_ms") {
        set_parsed(&mut config.transport.send_timeout_ms, value);
    }

    // Logging settings
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
    if let Some(value) = cli_args.get("log_format") {
        config.logging.format = value.clone();
    }
    if let Some(value) = cli_args.get("log_dir") {
        config.logging.directory = PathBuf::from(value);
    }
    if let Some(value) = cli_args.get("file_logging") {
        config.logging.file_logging = parse_flag(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var(CONFIG_PATH_ENV, config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var(CONFIG_PATH_ENV);

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();

        env::set_var(CONFIG_PATH_ENV, dir.path().join("absent.toml"));
        let result = find_config_file();
        env::remove_var(CONFIG_PATH_ENV);

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[node]").unwrap();
        writeln!(file, "process_name = \"orders\"").unwrap();
        writeln!(file, "[transport]").unwrap();
        writeln!(file, "poll_timeout_ms = 100").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.node.process_name, "orders");
        assert_eq!(config.transport.poll_timeout_ms, 100);
        assert_eq!(config.transport.handoff_capacity, 10_000);
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[node\nreceive_port = ").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[transport]\npoll_timeout_ms = 0\n").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = ShortBusConfig::default();

        env::set_var("SHORTBUS_MACHINE_NAME", "node-b");
        env::set_var("SHORTBUS_RECEIVE_PORT", "6006");
        env::set_var("SHORTBUS_HANDOFF_CAPACITY", "not-a-number");

        apply_environment_overrides(&mut config);

        env::remove_var("SHORTBUS_MACHINE_NAME");
        env::remove_var("SHORTBUS_RECEIVE_PORT");
        env::remove_var("SHORTBUS_HANDOFF_CAPACITY");

        assert_eq!(config.node.machine_name, "node-b");
        assert_eq!(config.node.receive_port, 6006);
        // Unparseable values leave the existing setting alone
        assert_eq!(config.transport.handoff_capacity, 10_000);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = ShortBusConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("receive_port".to_string(), "7007".to_string());
        cli_args.insert("log_level".to_string(), "debug".to_string());
        cli_args.insert("file_logging".to_string(), "yes".to_string());

        apply_cli_overrides(&mut config, &cli_args);

        assert_eq!(config.node.receive_port, 7007);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.file_logging);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        // CLI overrides take precedence over environment variables
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[node]").unwrap();
        writeln!(file, "machine_name = \"file-host\"").unwrap();
        writeln!(file, "receive_port = 5005").unwrap();

        env::set_var("SHORTBUS_MACHINE_NAME", "env-host");
        env::set_var("SHORTBUS_RECEIVE_PORT", "6006");

        let mut cli_args = HashMap::new();
        cli_args.insert("machine_name".to_string(), "cli-host".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args));

        env::remove_var("SHORTBUS_MACHINE_NAME");
        env::remove_var("SHORTBUS_RECEIVE_PORT");

        let config = config.unwrap();
        // CLI wins for machine name, env wins for port (no CLI override)
        assert_eq!(config.node.machine_name, "cli-host");
        assert_eq!(config.node.receive_port, 6006);
    }
}
