use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use centermesh::{ConnectionManager, Worker};
use centermesh_workers::{ServiceKind, WorkerSettings};

/// Runs one worker of the center management system.
#[derive(Parser, Debug)]
#[command(name = "centermesh-worker", version)]
struct Cli {
    /// The worker to run.
    #[arg(value_enum, env = "WORKER_SERVICE")]
    service: ServiceKind,
    /// Settings file, extension optional.
    #[arg(long, default_value = "config/worker")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "centermesh_workers=debug,centermesh=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = WorkerSettings::load(&cli.config)?;
    let service_name = cli.service.service_name();
    tracing::info!("Starting {} worker", service_name);

    let channels = Arc::new(settings.mesh.channel_registry()?);
    let broker = Arc::new(ConnectionManager::new(
        channels.address(),
        settings.mesh.connection.clone(),
    ));
    broker.connect().await?;
    tracing::info!(stats = ?broker.get_stats().await, "Broker connected");

    let registry = cli
        .service
        .registry(broker.clone(), channels.clone(), &settings.mesh.rpc)
        .await?;
    let worker = Worker::new(service_name, &channels, broker, registry, settings.worker)?;

    worker.run().await?;
    tracing::warn!("{} worker stopped", service_name);

    Ok(())
}
