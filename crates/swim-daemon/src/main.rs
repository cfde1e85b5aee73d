//! swim-daemon: Runs a single SWIM membership node.
//!
//! Starts listening, optionally joins an existing cluster through a seed node,
//! then serves protocol requests and gossips until Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swim_core::FailureDetectorConfig;
use swim_daemon::config::DEFAULT_BIND_ADDRESS;
use swim_daemon::{Node, NodeConfig};

#[derive(Parser, Debug)]
#[command(name = "swim-daemon")]
#[command(about = "SWIM gossip membership node")]
struct Args {
    /// Address to listen on for protocol connections
    #[arg(short, long, default_value = DEFAULT_BIND_ADDRESS)]
    bind: String,

    /// Address of a cluster member to join through
    #[arg(short, long)]
    join: Option<String>,

    /// Address peers should use to reach this node (defaults to the bound address)
    #[arg(long)]
    advertise: Option<String>,

    /// Gossip interval in milliseconds
    #[arg(short, long, default_value_t = 50)]
    interval: u64,

    /// Probe connect/read timeout in milliseconds
    #[arg(long, default_value_t = 500)]
    probe_timeout: u64,

    /// Number of helpers asked to probe an unresponsive member
    #[arg(long, default_value_t = 3)]
    indirect_probes: usize,

    /// Gossip cycles each membership update is piggybacked for
    #[arg(long, default_value_t = 2)]
    max_rounds: u32,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn node_config(&self) -> NodeConfig {
        NodeConfig {
            bind_address: self.bind.clone(),
            advertise_address: self.advertise.clone(),
            detector: FailureDetectorConfig {
                ping_interval: Duration::from_millis(self.interval),
                probe_timeout: Duration::from_millis(self.probe_timeout),
                indirect_probes: self.indirect_probes,
                max_rounds: self.max_rounds,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,swim_daemon=debug"
    } else {
        "info,swim_daemon=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting swim-daemon");

    let node = Node::start(args.node_config())
        .await
        .context("unable to start node")?;

    if let Some(seed) = args.join.as_deref() {
        node.join(seed)
            .await
            .with_context(|| format!("unable to join {}", seed))?;
    }

    info!("Listening on {}", node.local_member().address);

    tokio::select! {
        result = node.listen() => result?,

        // Handle graceful shutdown
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            node.shutdown();
        }
    }

    info!("Shutting down");
    Ok(())
}
