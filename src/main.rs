//! Gridmatch Server
//!
//! Authoritative session server for two-player grid games.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gridmatch::network::auth::AuthConfig;
use gridmatch::network::directory::SessionDirectory;
use gridmatch::network::server::{GameServer, ServerConfig};
use gridmatch::network::service::GameService;
use gridmatch::store::{MemoryGameStore, MemoryUserStore, UserRecord};
use gridmatch::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Gridmatch Server v{}", VERSION);

    let config = ServerConfig::from_env();
    let auth = AuthConfig::from_env();
    if !auth.is_configured() {
        warn!("No AUTH_SECRET or AUTH_PUBLIC_KEY_PEM set; all connections will be refused");
    }

    let store = Arc::new(MemoryGameStore::new());
    let users = Arc::new(MemoryUserStore::new());
    seed_users(&users).await?;

    let directory = Arc::new(SessionDirectory::new());
    let service = Arc::new(GameService::new(store, users.clone(), directory));

    let server = GameServer::new(config, auth, service, users);
    server.run().await.context("gateway exited with error")?;

    Ok(())
}

/// Load user records from the JSON file named by `GRIDMATCH_USERS_FILE`
/// into the in-process user directory. The in-memory backend has no
/// durable users of its own; without a seed file every connection is
/// refused as an unknown user.
async fn seed_users(users: &MemoryUserStore) -> anyhow::Result<()> {
    let path = match std::env::var("GRIDMATCH_USERS_FILE") {
        Ok(path) => path,
        Err(_) => {
            info!("GRIDMATCH_USERS_FILE not set, starting with an empty user directory");
            return Ok(());
        }
    };

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading user seed file {path}"))?;
    let records: Vec<UserRecord> =
        serde_json::from_str(&raw).with_context(|| format!("parsing user seed file {path}"))?;

    let count = records.len();
    for record in records {
        users.upsert(record).await;
    }
    info!("Seeded {} users from {}", count, path);

    Ok(())
}
