//! # centermesh workers
//!
//! The user, center, front and task workers of the center management system.
//! Each owns its records in an in-memory store and answers its message
//! patterns through a centermesh [`Worker`](centermesh::Worker). The task
//! worker also calls the front worker to schedule new tasks.

use clap::ValueEnum;
use futures_util::future::{self, Ready};
use std::future::Future;
use std::sync::Arc;

use centermesh::{Broker, ChannelRegistry, DomainError, PatternRegistry, Result, RpcClient, RpcSettings};

pub mod centers;
pub mod fronts;
pub mod models;
pub mod settings;
pub mod store;
pub mod tasks;
pub mod users;

pub use settings::WorkerSettings;

/// Which worker a process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServiceKind {
    User,
    Center,
    Front,
    Task,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 4] = [Self::User, Self::Center, Self::Front, Self::Task];

    /// Channel registry name of the service
    pub fn service_name(self) -> &'static str {
        match self {
            Self::User => users::SERVICE,
            Self::Center => centers::SERVICE,
            Self::Front => fronts::SERVICE,
            Self::Task => tasks::SERVICE,
        }
    }

    /// Build this worker's pattern registry over a fresh store.
    ///
    /// The task worker starts its own RPC client to reach the front worker.
    pub async fn registry(
        self,
        broker: Arc<dyn Broker>,
        channels: Arc<ChannelRegistry>,
        rpc: &RpcSettings,
    ) -> Result<PatternRegistry> {
        match self {
            Self::User => users::registry(Arc::new(users::UserService::new())),
            Self::Center => centers::registry(Arc::new(centers::CenterService::new())),
            Self::Front => fronts::registry(Arc::new(fronts::FrontService::new())),
            Self::Task => {
                let client = RpcClient::start(tasks::SERVICE, broker, channels, rpc).await?;
                tasks::registry(Arc::new(tasks::TaskService::new(client)))
            }
        }
    }
}

/// Adapt a synchronous service method into a pattern handler
pub(crate) fn method<S, T, R>(
    service: &Arc<S>,
    f: fn(&S, T) -> std::result::Result<R, DomainError>,
) -> impl Fn(T) -> Ready<std::result::Result<R, DomainError>> + Send + Sync + 'static
where
    S: Send + Sync + 'static,
    T: 'static,
    R: 'static,
{
    let service = service.clone();
    move |payload| future::ready(f(&service, payload))
}

/// Adapt an async service method taking `Arc<Self>` into a pattern handler
pub(crate) fn async_method<S, T, F, Fut>(service: &Arc<S>, f: F) -> impl Fn(T) -> Fut + Send + Sync + 'static
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, T) -> Fut + Send + Sync + 'static,
    Fut: Future,
{
    let service = service.clone();
    move |payload| f(service.clone(), payload)
}
