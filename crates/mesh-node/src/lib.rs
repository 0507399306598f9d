// ABOUTME: Collector daemon for the mesh
// ABOUTME: Loads configuration and runs DispatchService plus an optional RegistryService

pub mod config;
pub mod server;

pub use config::{Config, Overrides, RegistryBackend};
pub use server::Node;

use anyhow::Result;

/// Run a collector until it is told to stop
pub async fn run(config: Config) -> Result<()> {
    server::run(config).await
}
