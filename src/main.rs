use clap::Parser;
use hydra_mesh::{Hydra, HydraConfig, MemoryStore, Store};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Runs a single mesh instance against an in-process store.
#[derive(Debug, Parser)]
#[command(name = "hydra-node", version, about)]
struct Args {
    /// JSON service configuration (bare or under a top-level "hydra" key).
    #[arg(long, env = "HYDRA_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "HYDRA_SERVICE_NAME")]
    service_name: Option<String>,

    #[arg(long, env = "HYDRA_SERVICE_PORT")]
    service_port: Option<u16>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<HydraConfig> {
        let mut config = match self.config {
            Some(path) => HydraConfig::from_file(path)?,
            None => HydraConfig::new("hydra-node"),
        };
        if let Some(name) = self.service_name {
            config.service_name = name;
        }
        if let Some(port) = self.service_port {
            config.service_port = port;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config()?;
    let store: Arc<dyn Store> = MemoryStore::new();

    // 1. Init & register:
    let hydra = Hydra::init(config, store).await?;
    let registration = hydra.register_service().await?;
    tracing::info!(
        "Service {} listening as {}:{}",
        registration.service_name,
        registration.service_ip,
        registration.service_port
    );

    // 2. Inbound messages:
    if let Some(mut inbox) = hydra.take_messages() {
        tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                tracing::info!("Received {} from {:?}", message.mid, message.from);
            }
        });
    }

    // 3. Round trip through our own queue:
    let route = format!("{}:[post]/jobs", hydra.service_name());
    hydra
        .queue_message(&json!({
            "to": route,
            "from": format!("{}@{}:/", hydra.instance_id(), hydra.service_name()),
            "body": { "job": "warmup" }
        }))
        .await?;

    if let Some(item) = hydra.get_queued_message(hydra.service_name()).await? {
        let done = hydra.mark_queue_message(item, true, None).await?;
        tracing::info!("Processed queued message {}", done.mid);
    }

    // 4. Wait for Ctrl+C, then leave the mesh:
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    hydra.shutdown().await?;

    Ok(())
}
