//! King of the Hill Server
//!
//! Runs the tournament service behind the WebSocket sync server.
//! Configuration comes from the environment; see `ServerConfig::from_env`,
//! `ServiceConfig::from_env` and `AuthConfig::from_env`.

use std::sync::Arc;
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use koth::{
    VERSION,
    archive::InMemoryLogStore,
    network::{AuthConfig, ServerConfig, SyncServer},
    service::{ServiceConfig, TournamentService},
    tournament::{InMemoryRoster, Roster, RosterSeed},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("King of the Hill server v{}", VERSION);

    let roster = Arc::new(load_roster()?);
    info!(
        players = roster.players().len(),
        maps = roster.maps().len(),
        "Roster loaded"
    );

    let service = Arc::new(TournamentService::new(
        ServiceConfig::from_env(),
        roster,
        Arc::new(InMemoryLogStore::new()),
    ));

    let server = Arc::new(
        SyncServer::bind(ServerConfig::from_env(), AuthConfig::from_env(), service)
            .await
            .context("failed to start sync server")?,
    );

    let runner = server.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("Shutting down");
    server.shutdown();

    handle.await.context("server task panicked")??;
    Ok(())
}

/// Roster from `KOTH_ROSTER_FILE`, or an empty one.
fn load_roster() -> anyhow::Result<InMemoryRoster> {
    let Ok(path) = std::env::var("KOTH_ROSTER_FILE") else {
        return Ok(InMemoryRoster::new());
    };

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read roster file {}", path))?;
    let seed: RosterSeed = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse roster file {}", path))?;
    Ok(InMemoryRoster::from_seed(&seed)?)
}
