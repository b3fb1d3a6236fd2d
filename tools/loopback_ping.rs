// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end smoke test for a ShortBus node.
//!
//! Starts a `TransportHost`, sends `--count` JSON envelopes to its own receive
//! address and reads them back. By default the sends take the in-process
//! loopback; `--wire` sends them through a real DEALER socket instead.

use std::cell::Cell;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use shortbus::prelude::*;

struct Args {
    count: usize,
    timeout: Duration,
    wire: bool,
    config: Option<PathBuf>,
    overrides: HashMap<String, String>,
}

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: loopback_ping [--count <n>] [--timeout-ms <ms>] [--wire] [--config <path>]\n\
         \x20                    [--set <key>=<value>]... [--debug-<crate>| --debug-all]\n\n\
         Defaults:\n\
         - count: 10\n\
         - timeout-ms: 1000 (per message)\n\
         - config: shortbus.toml search, or built-in defaults\n"
    );
    process::exit(2);
}

fn parse_args() -> Args {
    let mut parsed = Args {
        count: 10,
        timeout: Duration::from_millis(1000),
        wire: false,
        config: None,
        overrides: HashMap::new(),
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--count" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.count = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--timeout-ms" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                let ms: u64 = v.parse().unwrap_or_else(|_| usage_and_exit());
                parsed.timeout = Duration::from_millis(ms);
            }
            "--wire" => parsed.wire = true,
            "--config" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.config = Some(PathBuf::from(v));
            }
            "--set" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                let (key, value) = v.split_once('=').unwrap_or_else(|| usage_and_exit());
                parsed.overrides.insert(key.to_string(), value.to_string());
            }
            "-h" | "--help" => usage_and_exit(),
            // Picked up by the logging setup
            other if other.starts_with("--debug-") => {}
            other => {
                eprintln!("Unknown argument: {other}");
                usage_and_exit();
            }
        }
    }

    parsed
}

fn main() {
    let args = parse_args();

    let config = match &args.config {
        Some(path) => shortbus::config::load_config(Some(path.as_path()), Some(&args.overrides)),
        None => shortbus::config::load_config_or_default(Some(&args.overrides)),
    }
    .unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        process::exit(2);
    });

    let _logging = shortbus::init_logging_from(&config).unwrap_or_else(|e| {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(2);
    });

    let host = TransportHost::start(&config).unwrap_or_else(|e| {
        eprintln!("Failed to start transport host: {e}");
        process::exit(1);
    });
    println!("Receiving on {}", host.receive_address());

    let sender: Arc<dyn OutboundTransport> = if args.wire {
        let settings = TransportSettings::from_address(host.receive_address().clone());
        let dealer = host.factory().build_outbound(&settings).unwrap_or_else(|e| {
            eprintln!("Failed to build outbound transport: {e}");
            process::exit(1);
        });
        dealer
    } else {
        host.endpoint().outbound().clone()
    };

    let started = Instant::now();
    for seq in 0..args.count {
        let payload = json!({ "seq": seq, "sent_by": host.receive_uri() });
        let message = OutboundMessage::json(format!("ping-{seq}"), &payload).unwrap_or_else(|e| {
            eprintln!("Failed to serialize ping {seq}: {e}");
            process::exit(1);
        });
        if let Err(e) = sender.send(&message) {
            eprintln!("Failed to send ping {seq}: {e}");
            process::exit(1);
        }
    }

    let received = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&received);
    let on_ping = move |_: &ReceiveContext| -> Option<MessageHandler> {
        let counter = Rc::clone(&counter);
        Some(handler(move |_| counter.set(counter.get() + 1)))
    };

    let mut idle = 0usize;
    let mut dropped = 0usize;
    while received.get() + dropped < args.count {
        match host.endpoint().receive(&on_ping, args.timeout) {
            ReceiveOutcome::Dispatched => {}
            ReceiveOutcome::Dropped(_) => dropped += 1,
            ReceiveOutcome::Idle => {
                idle += 1;
                break;
            }
        }
    }
    let elapsed = started.elapsed();

    println!(
        "Sent {}, received {}, dropped {} in {:.2?} via {}",
        args.count,
        received.get(),
        dropped,
        elapsed,
        if args.wire { "socket" } else { "loopback" }
    );

    host.shutdown();
    if received.get() != args.count || idle > 0 {
        process::exit(1);
    }
}
