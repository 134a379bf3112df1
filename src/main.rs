/*
 * This file is part of Addin Monitor.
 *
 * Copyright (C) 2025 Addin Monitor contributors
 *
 * Addin Monitor is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Addin Monitor is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Addin Monitor. If not, see <https://www.gnu.org/licenses/>.
 */

//! Add-in module monitor daemon (addin-monitord)
//!
//! Detects add-in modules on their SMBus segments, publishes their VPD as
//! inventory and refreshes each module's temperature once per second.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use addin_monitor::config::{config_path, load_config};
use addin_monitor::constants::paths::{JOURNAL_SOCKET, LOG_ENV};
use addin_monitor::inventory::{LogSink, MemorySink};
use addin_monitor::service::{run_monitor, Monitor};
use addin_monitor::BusChannel;

const VERSION: &str = env!("CARGO_PKG_VERSION");

struct Options {
    config: Option<PathBuf>,
    once: bool,
}

fn print_help() {
    eprintln!("addin-monitord {} - add-in module monitor", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    addin-monitord [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH   Config file (default: $ADDIN_MONITOR_CONFIG");
    eprintln!("                        or /etc/addin-monitor/config.json)");
    eprintln!("        --once          Discover and sample once, print properties as JSON");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    ADDIN_MONITOR_LOG     Log filter (trace, debug, info, warn, error)");
    eprintln!("    ADDIN_MONITOR_CONFIG  Config file path");
}

fn print_version() {
    println!("addin-monitord {}", VERSION);
}

/// `None` when the process should exit successfully (help/version printed).
fn parse_args() -> Option<Options> {
    let args: Vec<String> = std::env::args().collect();
    let mut opts = Options { config: None, once: false };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return None;
            }
            "-v" | "--version" => {
                print_version();
                return None;
            }
            "--once" => opts.once = true,
            "-c" | "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                opts.config = Some(PathBuf::from(&args[i]));
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }
    Some(opts)
}

fn init_logging() -> bool {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());

    if Path::new(JOURNAL_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&filter))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stderr", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(&filter)
        .init();
    false
}

fn verify_privileges(opts: &Options) -> Result<(), &'static str> {
    // SAFETY: geteuid is always safe - it just returns the process's effective user ID.
    let euid = unsafe { libc::geteuid() };
    if euid == 0 {
        return Ok(());
    }
    if opts.once && opts.config.is_some() {
        warn!("Not running as root (euid={}); bus access may be denied", euid);
        return Ok(());
    }
    Err("addin-monitord must run as root (euid=0) for SMBus access")
}

fn run_once(channel: Arc<BusChannel>, config_file: &Path) -> Result<()> {
    let sink = Arc::new(MemorySink::new());
    let monitor = Monitor::new(channel, sink.clone(), load_config(config_file));
    let modules = monitor.run_once();
    info!("Single pass complete: {} module(s) checked", modules.len());

    let json = serde_json::to_string_pretty(&sink.snapshot()).context("serializing properties")?;
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Some(opts) = parse_args() else {
        return Ok(());
    };

    let journald = init_logging();
    info!("STARTUP: addin-monitord {} starting", VERSION);
    info!("STARTUP: Logging to {}", if journald { "systemd journal" } else { "stderr" });

    if let Err(e) = verify_privileges(&opts) {
        error!("{}", e);
        std::process::exit(1);
    }

    let config_file = opts.config.clone().unwrap_or_else(config_path);
    info!("STARTUP: Config file: {}", config_file.display());

    let channel = Arc::new(BusChannel::linux());

    if opts.once {
        return tokio::task::spawn_blocking(move || run_once(channel, &config_file))
            .await
            .context("single pass task failed")?;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }

    let monitor = Arc::new(Monitor::new(channel, Arc::new(LogSink), load_config(&config_file)));
    run_monitor(monitor, shutdown).await?;

    info!("SHUTDOWN: addin-monitord terminated gracefully");
    Ok(())
}
