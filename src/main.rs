use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use halfsync::auth::{CredentialStore, MemoryStore};
use halfsync::cli::Cli;
use halfsync::config::Config;
use halfsync::server::Server;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load(),
    };
    cfg.apply(&cli)?;
    cfg.validate()?;

    let filter = if cfg.log_enabled {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("off")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    let store = match &cfg.users_file {
        Some(path) => MemoryStore::from_yaml_file(path)
            .with_context(|| format!("failed to load users from {}", path.display()))?,
        None => MemoryStore::new(),
    };
    tracing::info!(users = store.len(), "credential store ready");
    let store: Arc<dyn CredentialStore> = Arc::new(store);

    let mut server = Server::bind(cfg, store)?;
    server.forward_os_signals()?;
    server.run()?;

    tracing::info!("Shutdown complete");
    Ok(())
}
