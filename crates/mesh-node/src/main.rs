// ABOUTME: Entry point for the mesh-node collector daemon
// ABOUTME: Parses flags, merges them over the config file, and runs the collector

use anyhow::Result;
use clap::Parser;
use mesh_node::{Config, Overrides};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mesh-node", about = "Run a collector in the mesh")]
struct Cli {
    /// Config file (defaults to ~/.config/mesh/collector.toml)
    #[arg(long, short = 'c', env = "MESH_CONFIG")]
    config: Option<PathBuf>,

    /// Collector ID (defaults to a random UUID)
    #[arg(long, env = "MESH_COLLECTOR_ID")]
    id: Option<String>,

    /// Listen address (e.g., 127.0.0.1:50061)
    #[arg(long, env = "MESH_LISTEN_ADDR")]
    listen: Option<String>,

    /// Address peers use to reach this collector
    #[arg(long, env = "MESH_ADVERTISE_ADDRESS")]
    advertise: Option<String>,

    /// Namespace to participate in (repeatable or comma-separated)
    #[arg(long = "namespace", short = 'n', env = "MESH_NAMESPACES", value_delimiter = ',')]
    namespaces: Vec<String>,

    /// Peer to dial at startup (repeatable or comma-separated)
    #[arg(long = "peer", short = 'p', env = "MESH_PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// Print a default config file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", Config::default_toml());
        return Ok(());
    }

    mesh_log::init_for(&["mesh-node", "mesh-dispatch", "mesh-registry", "mesh-store"]);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply(Overrides {
        id: cli.id,
        listen_addr: cli.listen,
        advertise_address: cli.advertise,
        namespaces: cli.namespaces,
        peers: cli.peers,
    });

    mesh_node::run(config).await
}
