//! Argus agent entry point.

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use argus_agent::{Agent, AgentConfig};
use argus_telemetry::{Producers, SysinfoSensors};

/// Host telemetry agent. Configured entirely through the environment;
/// see the repository README for the variable reference.
#[derive(Parser)]
#[command(name = "argus-agent", version)]
struct Cli {}

fn main() -> anyhow::Result<()> {
    Cli::parse();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = argus_agent::VERSION, "starting argus agent");

    let config = AgentConfig::from_env()?;

    let producers = Producers {
        sensors: Some(Arc::new(SysinfoSensors::new())),
        ..Producers::default()
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, producers))?;

    tracing::info!("agent shut down cleanly");
    Ok(())
}

async fn run(config: AgentConfig, producers: Producers) -> anyhow::Result<()> {
    let (agent, events) = Agent::new(config, producers)?;
    tracing::info!(fingerprint = agent.fingerprint(), "agent identity ready");

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    agent.run(events, shutdown).await;
    Ok(())
}

/// Cancels the token on SIGINT or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::warn!("cannot install SIGTERM handler: {e}");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
            _ = term.recv() => tracing::info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received ctrl-c");
    }
    shutdown.cancel();
}
