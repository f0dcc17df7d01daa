//! Solipsist agent binary.
//!
//! Loads the configuration, opens the database, and runs the comment poller
//! and the reflection/publication schedule until Ctrl-C.
//!
//! # Environment Variables
//!
//! - `SOLIPSIST_CONFIG` — Path to the YAML configuration (default: `config/solipsist.yaml`)
//! - `OPENROUTER_API_KEY` — Language model API key
//! - `VK_ACCESS_TOKEN` — Community access token
//! - `VK_GROUP_ID` — Community id
//! - `SOLIPSIST_DB_PATH` — SQLite database path
//! - `RUST_LOG` — Tracing filter (default: "info,solipsist=debug")

use std::sync::Arc;

use anyhow::Context;
use solipsist::config::Config;
use solipsist::feed::VkClient;
use solipsist::llm::OpenRouterClient;
use solipsist::runtime::{shutdown_signal, Runtime, Schedule};
use solipsist::server::{self, AppState};
use solipsist::storage::SqliteStore;
use solipsist::Solipsist;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,solipsist=debug".into()),
        )
        .init();

    tracing::info!("Starting solipsist v{}", solipsist::VERSION);

    let config = Config::load().context("invalid configuration")?;

    let store = Arc::new(
        SqliteStore::open(&config.database.path)
            .with_context(|| format!("cannot open database {}", config.database.path.display()))?,
    );
    let llm = Arc::new(OpenRouterClient::new(&config.llm)?);
    let feed = Arc::new(VkClient::new(&config.feed)?);

    let agent = Solipsist::new(&config, llm, feed.clone(), store.clone())?;
    let state = agent.state();
    tracing::info!(
        certainty = state.certainty,
        intrusion = state.intrusion,
        coherence = state.coherence,
        "Agent ready"
    );

    if let Some(addr) = config.server.bind.clone() {
        let app_state = AppState::new(store.clone());
        tokio::spawn(async move {
            if let Err(e) = server::serve(&addr, app_state).await {
                tracing::error!(error = %e, "Status server failed");
            }
        });
    }

    Runtime::new(agent, feed, Schedule::from_config(&config))
        .run(shutdown_signal())
        .await;

    tracing::info!("Solipsist stopped");
    Ok(())
}
