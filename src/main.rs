//! WolfKV - Replicated Key-Value Store
//!
//! Node binary: serves client and peer calls, gossips with configured peers
//! and exposes the HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfkv::api::HttpServer;
use wolfkv::config::WolfKvConfig;
use wolfkv::network::{tls, NetworkClient, NetworkServer};
use wolfkv::replication::{GossipClient, GossipConfig, ReplicaService};
use wolfkv::store::Database;
use wolfkv::error::Result;
use wolfkv::NodeId;

/// WolfKV - Replicated Key-Value Store
#[derive(Parser)]
#[command(name = "wolfkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults apply if it does not exist)
    #[arg(short, long, default_value = "wolfkv.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides `[logging] level`
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WolfKV node
    Start {
        /// Port to serve calls on (overrides node.bind_address port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Dial peers over TLS
        #[arg(long)]
        secure: bool,

        /// Comma-separated peer addresses (host:port)
        #[arg(long)]
        servers: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfkv.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; a broken config file is reported by the command itself
    let file_config = WolfKvConfig::load_or_default(&cli.config).unwrap_or_default();
    init_logging(file_config.log_level(cli.log_level.as_deref()));

    match cli.command {
        Commands::Start { port, secure, servers } => {
            run_start(cli.config, port, secure, servers).await
        }
        Commands::Init { output } => {
            run_init(output)
        }
        Commands::Validate => {
            run_validate(cli.config)
        }
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Start the WolfKV node
async fn run_start(
    config_path: PathBuf,
    port: Option<u16>,
    secure: bool,
    servers: Option<String>,
) -> Result<()> {
    tracing::info!("Starting WolfKV node...");

    let mut config = match WolfKvConfig::load_or_default(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            return Err(e);
        }
    };
    config.apply_overrides(port, secure, servers.as_deref());
    config.validate()?;

    let node_id = NodeId::random();
    tracing::info!("Node ID: {}", node_id);

    let database = Arc::new(Database::new(node_id));
    let shutdown = CancellationToken::new();

    // Serve client and peer calls
    let service = Arc::new(ReplicaService::new(Arc::clone(&database)));
    let acceptor = tls::build_acceptor(&config.tls)?;
    let network_server = NetworkServer::new(config.node.bind_address.clone(), service, shutdown.clone())
        .with_tls(acceptor);
    let listener = network_server.bind().await?;
    let network_server_handle = tokio::spawn(async move {
        if let Err(e) = network_server.serve(listener).await {
            tracing::error!("Network server error: {}", e);
        }
    });

    // Gossip with every configured peer except ourselves
    let peers = config.gossip_peers();
    let network_client = Arc::new(NetworkClient::with_security(
        config.connect_timeout(),
        config.request_timeout(),
        config.cluster.secure,
        config.tls.ca_file.as_deref(),
    )?);
    let gossip = Arc::new(GossipClient::new(
        Arc::clone(&database),
        network_client,
        GossipConfig {
            interval_ms: config.cluster.gossip_interval_ms,
            ..GossipConfig::default()
        },
    ));
    let gossip_handles = gossip.spawn(&peers, shutdown.clone());
    if peers.is_empty() {
        tracing::info!("No peers configured, running standalone");
    }

    let http_server = HttpServer::new(
        config.api.clone(),
        Arc::clone(&database),
        peers,
        config.cluster.gossip_interval_ms,
    );
    let http_server_handle = tokio::spawn(async move {
        if let Err(e) = http_server.start().await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Received shutdown signal");

    // Cleanup
    shutdown.cancel();
    futures::future::join_all(gossip_handles).await;
    let _ = network_server_handle.await;
    http_server_handle.abort();

    tracing::info!("WolfKV shutdown complete");
    Ok(())
}

/// Initialize a new configuration file
fn run_init(output: PathBuf) -> Result<()> {
    let config_content = r#"# WolfKV Configuration
# Generated configuration file

[node]
bind_address = "0.0.0.0:3100"
# advertise_address = "my-public-ip:3100"

[cluster]
peers = []
# peers = ["node-2.example.com:3100", "node-3.example.com:3100"]
secure = false
gossip_interval_ms = 1000
connect_timeout_ms = 5000
request_timeout_ms = 30000

[tls]
# cert_file = "/etc/wolfkv/cert.pem"
# key_file = "/etc/wolfkv/key.pem"
# ca_file = "/etc/wolfkv/ca.pem"

[api]
enabled = true
bind_address = "0.0.0.0:8080"
cors_enabled = false

[logging]
level = "info"
"#;

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to configure your cluster settings.");
    println!("Then start with: wolfkv --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfKvConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Bind Address: {}", config.node.bind_address);
            println!("  Peers: {}", config.gossip_peers().len());
            println!("  Gossip Interval: {}ms", config.cluster.gossip_interval_ms);
            println!("  TLS: {}", if config.tls.cert_file.is_some() { "enabled" } else { "disabled" });
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}
