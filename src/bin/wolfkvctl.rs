//! WolfKvCtl - Command line client for WolfKV nodes
//!
//! Usage:
//!   wolfkvctl get <key>          - Print every chunk of a key, one JSON line each
//!   wolfkvctl put <key> <data>   - Write a value through a node
//!   wolfkvctl status             - Show a node's status from its HTTP API

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use wolfkv::api::{ChunkView, PutResponse, StatusResponse};
use wolfkv::network::NetworkClient;

/// WolfKV Client
#[derive(Parser)]
#[command(name = "wolfkvctl")]
#[command(about = "Read and write keys on WolfKV nodes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options for commands that call a node directly
#[derive(clap::Args)]
struct NodeArgs {
    /// Node to call (host:port)
    #[arg(long, default_value = "localhost:3100")]
    hostname: String,

    /// Connect over TLS
    #[arg(long)]
    secure: bool,

    /// CA bundle to trust (PEM); webpki roots if unset
    #[arg(long)]
    ca_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every chunk stored for a key
    Get {
        key: String,
        #[command(flatten)]
        node: NodeArgs,
    },
    /// Write a value for a key
    Put {
        key: String,
        data: String,
        #[command(flatten)]
        node: NodeArgs,
    },
    /// Show status of a node
    Status {
        /// API endpoint to query
        #[arg(short, long, default_value = "http://127.0.0.1:8080")]
        endpoint: String,
    },
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Get { key, node } => get(&node, &key).await,
        Commands::Put { key, data, node } => put(&node, &key, data).await,
        Commands::Status { endpoint } => show_status(&endpoint).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

// ============ Commands ============

fn connect(node: &NodeArgs) -> anyhow::Result<NetworkClient> {
    NetworkClient::with_security(
        Duration::from_secs(5),
        Duration::from_secs(30),
        node.secure,
        node.ca_file.as_deref(),
    )
    .context("failed to set up client")
}

async fn get(node: &NodeArgs, key: &str) -> anyhow::Result<()> {
    let client = connect(node)?;
    let mut stream = client.get(&node.hostname, key).await?;

    while let Some(reply) = stream.next().await? {
        println!("{}", serde_json::to_string(&ChunkView::from(&reply))?);
    }
    Ok(())
}

async fn put(node: &NodeArgs, key: &str, data: String) -> anyhow::Result<()> {
    let client = connect(node)?;
    let (node_id, version) = client.put(&node.hostname, key, data.into_bytes()).await?;

    println!("{}", serde_json::to_string(&PutResponse { node_id, version })?);
    Ok(())
}

async fn show_status(endpoint: &str) -> anyhow::Result<()> {
    let url = format!("{}/status", endpoint.trim_end_matches('/'));
    let client = reqwest::Client::new();

    let response = client.get(&url).send().await?;

    if !response.status().is_success() {
        anyhow::bail!("API error: {}", response.status());
    }

    let status: StatusResponse = response.json().await?;

    println!();
    println!("Node Status");
    println!("===========");
    println!();
    println!("Node ID:         {}", status.node_id);
    println!("Keys:            {}", status.keys);
    println!("Gossip Interval: {}ms", status.gossip_interval_ms);
    println!("Peers:           {}", status.peers.len());
    for peer in &status.peers {
        println!("  - {}", peer);
    }
    println!();

    Ok(())
}
