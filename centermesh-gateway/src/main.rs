use anyhow::Result;
use axum::http::header;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use centermesh::{ConnectionManager, RpcClient};
use centermesh_gateway::{create_router, GatewaySettings, GatewayState, RouteTable};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "centermesh_gateway=debug,centermesh=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = GatewaySettings::load()?;
    tracing::info!("Configuration loaded");

    let channels = Arc::new(settings.mesh.channel_registry()?);
    let routes = RouteTable::new(settings.routes.clone());
    routes.validate(&channels)?;

    let broker = Arc::new(ConnectionManager::new(
        channels.address(),
        settings.mesh.connection.clone(),
    ));
    broker.connect().await?;
    tracing::info!(stats = ?broker.get_stats().await, "Broker connected");

    // Reply consumer is running once start returns
    let client = RpcClient::start("api_gateway", broker, channels, &settings.mesh.rpc).await?;

    let app = create_router(GatewayState::new(client, routes)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
            ),
    );

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_address).await?;
    tracing::info!("Gateway listening on {}", settings.server.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
