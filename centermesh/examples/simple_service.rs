//! A worker and a client talking over the in-process broker.
//!
//! Run with `cargo run -p centermesh --example simple_service`.

use centermesh::{
    channel::default_channels, ChannelRegistry, DomainError, MemoryBroker, PatternRegistry,
    RpcClient, RpcSettings, Worker, WorkerConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::info;

centermesh::define_patterns! {
    pub enum ItemPattern {
        Create => "item.create",
        Get => "item.get",
    }
}

#[derive(Deserialize)]
struct CreateItem {
    name: String,
}

#[derive(Serialize)]
struct Item {
    id: u64,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let broker = Arc::new(MemoryBroker::new());
    let channels = Arc::new(ChannelRegistry::new(default_channels())?);

    let registry = PatternRegistry::builder::<ItemPattern>()
        .json(ItemPattern::Create, |item: CreateItem| async move {
            Ok(Item { id: 1, name: item.name })
        })
        .json(ItemPattern::Get, |id: u64| async move {
            Err::<Item, _>(DomainError::not_found(format!("Item {} not found", id)))
        })
        .build()?;

    let worker = Worker::new("user_service", &channels, broker.clone(), registry, WorkerConfig::default())?;
    worker.listen().await?;

    let client = RpcClient::start("demo", broker, channels, &RpcSettings::default()).await?;

    let created = client
        .call("user_service", "item.create", json!({"name": "lamp"}), Duration::from_secs(1))
        .await?;
    info!("Created: {}", created);

    match client.call("user_service", "item.get", json!(42), Duration::from_secs(1)).await {
        Ok(item) => info!("Found: {}", item),
        Err(e) => info!("Lookup failed ({}): {}", e.kind(), e),
    }

    match client.call("user_service", "item.delete", json!(42), Duration::from_secs(1)).await {
        Ok(_) => info!("Unexpected success"),
        Err(e) => info!("Lookup failed ({}): {}", e.kind(), e),
    }

    Ok(())
}
