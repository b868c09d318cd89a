//! tunnel-agent socket server
//!
//! Accepts TCP clients speaking newline-delimited JSON and gives each one its
//! own agent session backed by the configured LLM provider.

mod config;
mod connection;
mod framing;
mod server;
mod state;

use std::sync::Arc;

use agent_core::{AgentBuilder, ToolExecutor};
use agent_runtime::build_provider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Settings;
use crate::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;
    tracing::debug!(?settings, "Loaded settings");

    let provider = build_provider(settings.provider, &settings.provider_config())?;
    let agent = AgentBuilder::new()
        .provider(provider)
        .tools(ToolExecutor::new().with_command_timeout(settings.command_timeout))
        .system_prompt(settings.system_prompt.clone())
        .max_rounds(settings.max_rounds)
        .build()?;

    tracing::info!(
        provider = %settings.provider,
        model = %settings.model,
        tools = ?agent.tools().schemas().iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        "Agent ready"
    );

    let server = Server::bind(settings.bind_addr(), Arc::new(agent)).await?;
    tracing::info!("Listening on {}", server.local_addr()?);

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    tracing::info!("Server stopped");
    Ok(())
}
