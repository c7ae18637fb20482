// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mesh-to-MQTT Gateway CLI
//!
//! # Usage
//!
//! ```bash
//! # Bridge the default mesh socket to a local broker
//! meshgate
//!
//! # Point at a remote broker
//! meshgate --broker-host 192.168.0.235 --broker-port 1883
//!
//! # Using configuration file
//! meshgate --config gateway.toml
//!
//! # Suppress echo back to publishing nodes
//! meshgate --suppress-self-delivery
//! ```

use clap::{Parser, Subcommand};
use meshgate::{Gateway, GatewayConfig, GatewayStatsSnapshot, PeerConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Mesh-to-MQTT Bridging Gateway
#[derive(Parser, Debug)]
#[command(name = "meshgate")]
#[command(about = "Mesh-to-MQTT bridging gateway - subscription registry and bidirectional routing")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker hostname or IP
    #[arg(long, conflicts_with = "config")]
    broker_host: Option<String>,

    /// Broker port
    #[arg(long, conflicts_with = "config")]
    broker_port: Option<u16>,

    /// MQTT client identifier
    #[arg(long, conflicts_with = "config")]
    client_id: Option<String>,

    /// UDP bind address for the mesh socket
    #[arg(long, conflicts_with = "config")]
    bind: Option<String>,

    /// Do not deliver a node's published message back to itself
    #[arg(long)]
    suppress_self_delivery: bool,

    /// Statistics reporting interval (seconds, 0 to disable; overrides
    /// the config file)
    #[arg(long)]
    stats_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error; overrides the config
    /// file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "gateway.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Handle subcommands
    if let Some(cmd) = args.command {
        init_logging(args.log_level.as_deref().unwrap_or("info"));
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    // The effective log level comes from the resolved configuration, so a
    // file-loaded log_level is honored unless the flag overrides it.
    let config = build_config(&args)?;
    init_logging(&config.log_level);

    println!("Mesh-to-MQTT Gateway v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!();
    println!(
        "Broker: {}:{} (client id {})",
        config.broker.host, config.broker.port, config.broker.client_id
    );
    println!("Mesh:   {}", config.mesh.bind);
    println!();
    println!("Press Ctrl+C to stop...");
    println!();

    let stats_interval = config.stats_interval_secs;
    let handle = Gateway::new(config)?.run().await?;

    // Stats reporting task
    let stats_handle = handle.clone();
    if stats_interval > 0 {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(stats_interval));
            loop {
                interval.tick().await;
                if !stats_handle.is_running() {
                    break;
                }
                print_stats(&stats_handle.stats().snapshot());
            }
        });
    }

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    handle.stop();
    handle.stopped().await;

    println!("\nFinal Statistics:");
    print_stats(&handle.stats().snapshot());

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<GatewayConfig, Box<dyn std::error::Error>> {
    let mut config = match args.config {
        Some(ref config_path) => GatewayConfig::from_file(config_path)?,
        None => {
            // Build from command line arguments
            let mut config = GatewayConfig::default();
            if let Some(ref host) = args.broker_host {
                config.broker.host = host.clone();
            }
            if let Some(port) = args.broker_port {
                config.broker.port = port;
            }
            if let Some(ref client_id) = args.client_id {
                config.broker.client_id = client_id.clone();
            }
            if let Some(ref bind) = args.bind {
                config.mesh.bind = bind.clone();
            }
            config
        }
    };

    // Flags that were actually given override the file values.
    if args.suppress_self_delivery {
        config.suppress_self_delivery = true;
    }
    if let Some(interval) = args.stats_interval {
        config.stats_interval_secs = interval;
    }
    if let Some(ref level) = args.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = GatewayConfig {
        name: "example-gateway".into(),
        ..Default::default()
    };
    config.broker.host = "192.168.0.235".into();
    config.mesh.peers = vec![PeerConfig {
        addr: "AA:BB:CC:DD:EE:01".parse()?,
        endpoint: "192.168.0.41:5151".parse()?,
    }];

    let toml_str = toml::to_string_pretty(&config)?;

    let content = format!(
        r#"# Mesh-to-MQTT Gateway Configuration
# Generated by meshgate gen-config
#
# Static peers are optional; the gateway also learns peer endpoints from
# inbound mesh frames.

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match GatewayConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Gateway: {}", config.name);
            println!(
                "Broker:  {}:{} (client id {})",
                config.broker.host, config.broker.port, config.broker.client_id
            );
            println!(
                "Mesh:    {} (frame limit {} bytes, {} static peers)",
                config.mesh.bind,
                config.mesh.frame_limit,
                config.mesh.peers.len()
            );
            println!(
                "Self-delivery: {}",
                if config.suppress_self_delivery {
                    "suppressed"
                } else {
                    "preserved"
                }
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_stats(stats: &GatewayStatsSnapshot) {
    println!("--- Gateway Statistics ---");
    println!(
        "  Subscriptions: {} accepted, {} unsubscribes ({} broker unsubscribes)",
        stats.subscriptions_accepted, stats.unsubscribes_processed, stats.broker_unsubscribes
    );
    println!(
        "  Mesh -> broker: {} publishes routed, {} broker publishes",
        stats.publishes_routed, stats.broker_publishes
    );
    println!(
        "  Broker -> mesh: {} deliveries forwarded, {} mesh frames sent",
        stats.broker_messages_forwarded, stats.mesh_frames_sent
    );
    println!(
        "  Dropped: {} malformed, {} missing topic, {} no subscribers; {} send errors",
        stats.dropped_malformed,
        stats.dropped_missing_topic,
        stats.dropped_no_subscribers,
        stats.send_errors
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "{}", contents).expect("write");
        file
    }

    #[test]
    fn test_config_file_reporting_knobs_take_effect() {
        let file = config_file(
            r#"
stats_interval_secs = 0
log_level = "debug"
"#,
        );

        let args = Args::parse_from([
            "meshgate",
            "--config",
            file.path().to_str().expect("path"),
        ]);
        let config = build_config(&args).expect("config");

        assert_eq!(config.stats_interval_secs, 0);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_cli_flags_override_config_file() {
        let file = config_file(
            r#"
stats_interval_secs = 30
log_level = "debug"
"#,
        );

        let args = Args::parse_from([
            "meshgate",
            "--config",
            file.path().to_str().expect("path"),
            "--stats-interval",
            "5",
            "--log-level",
            "warn",
        ]);
        let config = build_config(&args).expect("config");

        assert_eq!(config.stats_interval_secs, 5);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_defaults_without_config_file() {
        let args = Args::parse_from(["meshgate"]);
        let config = build_config(&args).expect("config");

        assert_eq!(config.stats_interval_secs, 10);
        assert_eq!(config.log_level, "info");
        assert!(!config.suppress_self_delivery);
    }
}
