//! # centermesh gateway
//!
//! HTTP edge of the center management backend. Every inbound request is
//! matched against an ordered prefix table, turned into a correlated RPC call
//! to the owning worker, and answered with that worker's reply.
//!
//! ```text
//! Client -> HTTP -> Gateway -> broker -> Worker
//!                      ^                   |
//!                      +---- reply <-------+
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use centermesh::{ConnectionManager, RpcClient};
//! use centermesh_gateway::{create_router, GatewaySettings, GatewayState, RouteTable};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = GatewaySettings::load()?;
//!     let channels = Arc::new(settings.mesh.channel_registry()?);
//!     let broker = Arc::new(ConnectionManager::new(channels.address(), settings.mesh.connection.clone()));
//!     broker.connect().await?;
//!
//!     let client = RpcClient::start("api_gateway", broker, channels, &settings.mesh.rpc).await?;
//!     let app = create_router(GatewayState::new(client, RouteTable::new(settings.routes)));
//!
//!     let listener = tokio::net::TcpListener::bind(&settings.server.bind_address).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod router;
pub mod server;
pub mod settings;

pub use router::{default_routes, RouteEntry, RouteTable, RoutedCall};
pub use server::{create_router, GatewayError, GatewayState};
pub use settings::{GatewaySettings, ServerSettings};
