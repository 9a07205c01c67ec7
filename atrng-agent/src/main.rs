// SPDX-License-Identifier: MIT
//
// ATRNG Client: Entropy Contribution Library
// Copyright (c) 2025 ATRNG Client Contributors
//
// https://github.com/atdevs/atrng-client

//! ATRNG Agent - command-line front end for the ATRNG client
//!
//! Runs the keepalive and discard loops as a long-lived process, or performs a
//! one-shot fetch or send.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   discard()   ┌──────────────┐   Socket.IO    ┌──────────────┐
//! │    stdin     │ ─────────────>│    Agent     │ ──────────────>│  Collection  │
//! │   (lines)    │               │  (buffer)    │   (wss)        │   Service    │
//! └──────────────┘               └──────────────┘                └──────────────┘
//!                                       │
//!                                       │ GET (https)
//!                                       ▼
//!                                ┌──────────────┐
//!                                │  Random API  │
//!                                └──────────────┘
//! ```
//!
//! Configuration comes from `ATRNG_`-prefixed environment variables.

use anyhow::{Context, Result};
use atrng_core::{
    config::{ClientConfig, HashAlgorithm},
    AtrngClient,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "atrng-agent")]
#[command(about = "ATRNG Agent - contributes and fetches entropy", long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Override the configured hash algorithm (sha256, sha384, sha512)
    #[arg(long)]
    hash: Option<HashAlgorithm>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run keepalive and discard loops, feeding stdin lines into the discard buffer
    Run {
        /// Parse each stdin line as JSON (a string or an array of bytes)
        #[arg(long)]
        json: bool,
    },
    /// Fetch remote randomness and print its digest
    Fetch {
        #[arg(long, value_enum, default_value_t = FetchFormat::Hex)]
        format: FetchFormat,
    },
    /// Send one message to the collection service
    Send {
        /// Text to send
        data: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FetchFormat {
    Hex,
    Integer,
}

async fn run(client: Arc<AtrngClient>, json: bool) -> Result<()> {
    info!("ATRNG Agent v{}", atrng_core::VERSION);
    client.start().await;

    let reader = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { feed_stdin(&client, json).await })
    };

    wait_for_shutdown().await?;
    info!("Shutdown signal received, stopping loops...");

    reader.abort();
    client.shutdown().await;

    let snapshot = serde_json::to_string(&client.metrics().snapshot())
        .context("Failed to serialise metrics")?;
    info!("Final metrics: {}", snapshot);
    Ok(())
}

/// Discard every stdin line until EOF
async fn feed_stdin(client: &AtrngClient, json: bool) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) if json => match serde_json::from_str(&line) {
                Ok(value) => {
                    if let Err(e) = client.discard_value(value) {
                        warn!("Rejected stdin line: {}", e);
                    }
                }
                Err(e) => warn!("Stdin line is not JSON: {}", e),
            },
            Ok(Some(line)) => client.discard(line),
            Ok(None) => {
                info!("Stdin closed, loops keep running until shutdown");
                break;
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use futures::stream::StreamExt;
        use signal_hook::consts::signal::*;
        use signal_hook_tokio::Signals;

        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;

        if let Some(signal) = signals.next().await {
            info!("Received signal: {:?}", signal);
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C signal");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = args
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .json()
        .init();

    info!("Loading configuration from environment variables");
    let mut config =
        ClientConfig::from_env().context("Failed to load configuration from environment")?;

    if let Some(hash) = args.hash {
        config.hash_algorithm = hash;
    }

    let client = Arc::new(AtrngClient::new(config).context("Failed to create client")?);

    match args.command.unwrap_or(Command::Run { json: false }) {
        Command::Run { json } => run(client, json).await,
        Command::Fetch { format } => {
            match format {
                FetchFormat::Hex => println!("{}", client.fetch_hex().await?),
                FetchFormat::Integer => println!("{}", client.fetch_integer().await?),
            }
            Ok(())
        }
        Command::Send { data } => {
            client.send_data(data).await;
            client.shutdown().await;
            Ok(())
        }
    }
}
