//! # centermesh - correlated RPC over RabbitMQ
//!
//! The messaging core of the center management backend. A gateway calls
//! workers through an [`RpcClient`]; each worker answers through a [`Worker`]
//! that dispatches envelopes to its [`PatternRegistry`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use centermesh::{ChannelRegistry, ConnectionManager, PatternRegistry, Worker, WorkerConfig};
//! use centermesh::settings::MeshSettings;
//!
//! centermesh::define_patterns! {
//!     pub enum EchoPattern {
//!         Echo => "echo.say",
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = MeshSettings::default();
//!     let channels = settings.channel_registry()?;
//!     let broker = Arc::new(ConnectionManager::new(channels.address(), settings.connection.clone()));
//!     broker.connect().await?;
//!
//!     let registry = PatternRegistry::builder::<EchoPattern>()
//!         .function(EchoPattern::Echo, |payload| async move { Ok(payload) })
//!         .build()?;
//!
//!     Worker::new("user_service", &channels, broker, registry, WorkerConfig::default())?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod channel;
pub mod client;
pub mod connection;
pub mod error;
pub mod memory;
pub mod message;
pub mod pattern;
pub mod pending;
pub mod service;
pub mod settings;

pub use broker::{Broker, InboundMessage, OutboundMessage, QueueOptions};
pub use channel::{ChannelConfig, ChannelRegistry};
pub use client::RpcClient;
pub use connection::{ConnectionConfig, ConnectionManager};
pub use error::{DomainError, MeshError, Result, RpcError};
pub use memory::MemoryBroker;
pub use message::{CorrelationId, ReplyEnvelope, RequestEnvelope};
pub use pattern::{HandlerResult, Pattern, PatternHandler, PatternRegistry};
pub use pending::PendingCalls;
pub use service::{dispatch, Worker, WorkerConfig, WorkerStatus};
pub use settings::{MeshSettings, RpcSettings};
