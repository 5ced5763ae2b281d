// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! vflow bulk-data hub
//!
//! One hub runs per node. Every rank's Data Manager connects to it and all
//! bulk transfers between ranks are relayed through it.
//!
//! # Usage
//!
//! ```bash
//! # Start hub 0 on the default port (31094)
//! vflow-hub
//!
//! # Hub for node 3 with a config file
//! vflow-hub --hub-id 3 --config hub.toml
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use vflow_hub::{BulkHub, HubConfig};

/// vflow hub - relays bulk object transfers between the ranks of a node
#[derive(Parser, Debug)]
#[command(name = "vflow-hub")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "31094")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Id of the node served by this hub
    #[arg(long, default_value = "0")]
    hub_id: i32,

    /// Largest accepted frame in bytes
    #[arg(long)]
    max_message_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = if let Some(config_path) = args.config {
        info!("Loading config from {:?}", config_path);
        HubConfig::from_file(&config_path)?
    } else {
        let defaults = HubConfig::default();
        HubConfig {
            bind_address: args.bind.parse()?,
            port: args.port,
            hub_id: args.hub_id,
            max_message_size: args.max_message_size.unwrap_or(defaults.max_message_size),
            ..defaults
        }
    };

    let addr = SocketAddr::new(config.bind_address, config.port);

    info!("+----------------------------------------------------+");
    info!(
        "|       vflow hub v{}                             |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Bind:   {:40} |", addr);
    info!("|  Hub:    {:40} |", config.hub_id);
    info!(
        "|  Frames: {:40} |",
        format!("{} MB max", config.max_message_size / (1024 * 1024))
    );
    info!("+----------------------------------------------------+");

    let hub = BulkHub::new(config)?;

    let hub_handle = hub.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping hub...");
        hub_handle.shutdown();
    });

    hub.run().await?;

    info!("Hub stopped");
    Ok(())
}
