use futures_util::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::{Broker, InboundMessage, OutboundMessage, QueueOptions};
use crate::channel::{ChannelConfig, ChannelRegistry};
use crate::error::{Result, INVALID_ENVELOPE};
use crate::message::{CorrelationId, ReplyEnvelope, RequestEnvelope};
use crate::pattern::PatternRegistry;

/// Configuration for a worker process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum envelopes handled at the same time
    pub max_concurrent_messages: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_messages: 100,
        }
    }
}

/// Worker operational status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Registry built, not yet consuming
    Starting,
    /// Consuming its channel
    Running,
    /// The channel's delivery stream ended
    Stopped,
}

/// Consumes one service's channel and answers each envelope through the
/// worker's pattern registry.
///
/// Envelopes are handled concurrently, up to `max_concurrent_messages`; a
/// delivery is acked once its reply is published and requeued when the reply
/// cannot be published.
#[derive(Debug)]
pub struct Worker {
    channel: ChannelConfig,
    broker: Arc<dyn Broker>,
    registry: Arc<PatternRegistry>,
    limiter: Arc<Semaphore>,
    config: WorkerConfig,
    status: Arc<RwLock<WorkerStatus>>,
}

impl Worker {
    pub fn new(
        service_name: &str,
        channels: &ChannelRegistry,
        broker: Arc<dyn Broker>,
        registry: PatternRegistry,
        config: WorkerConfig,
    ) -> Result<Self> {
        let channel = channels.require(service_name)?.clone();
        info!(
            "Creating worker {} on {} with {} patterns",
            channel.service_name,
            channel.channel_name,
            registry.len()
        );

        Ok(Self {
            channel,
            broker,
            registry: Arc::new(registry),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_messages.max(1))),
            config,
            status: Arc::new(RwLock::new(WorkerStatus::Starting)),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.channel.service_name
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub async fn status(&self) -> WorkerStatus {
        self.status.read().await.clone()
    }

    /// Declare the channel and start consuming it.
    ///
    /// Returns once the consumer is attached; the returned task runs until
    /// the delivery stream ends.
    pub async fn listen(&self) -> Result<JoinHandle<()>> {
        let queue = &self.channel.channel_name;
        self.broker
            .declare_queue(queue, QueueOptions::channel(self.channel.durable))
            .await?;

        let consumer_tag = format!("{}-requests-{}", self.channel.service_name, Uuid::new_v4());
        let mut deliveries = self.broker.consume(queue, &consumer_tag).await?;

        let broker = self.broker.clone();
        let registry = self.registry.clone();
        let limiter = self.limiter.clone();
        let status = self.status.clone();
        let service_name = self.channel.service_name.clone();

        *self.status.write().await = WorkerStatus::Running;
        info!(
            "Worker {} is consuming {} (max concurrent messages: {})",
            service_name, queue, self.config.max_concurrent_messages
        );

        let handle = tokio::spawn(async move {
            while let Some(delivery) = deliveries.next().await {
                match delivery {
                    Ok(delivery) => {
                        let Ok(permit) = limiter.clone().acquire_owned().await else {
                            break;
                        };
                        let broker = broker.clone();
                        let registry = registry.clone();
                        tokio::spawn(async move {
                            if let Err(e) = process_delivery(delivery, &registry, broker.as_ref()).await {
                                error!("Error processing request: {}", e);
                            }
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!("Error receiving message: {}", e);
                    }
                }
            }

            warn!("Request processor stopped for {}", service_name);
            *status.write().await = WorkerStatus::Stopped;
        });

        Ok(handle)
    }

    /// Consume until the channel closes
    pub async fn run(&self) -> Result<()> {
        let handle = self.listen().await?;
        handle.await?;
        Ok(())
    }
}

/// Resolve an envelope against a registry and produce its reply.
///
/// Unregistered patterns are answered with `UnknownPattern`; handler failures
/// become error replies carrying the handler's own kind.
pub async fn dispatch(registry: &PatternRegistry, envelope: RequestEnvelope) -> ReplyEnvelope {
    let RequestEnvelope {
        pattern,
        payload,
        correlation_id,
    } = envelope;

    let Some(handler) = registry.get(&pattern) else {
        error!(%correlation_id, pattern = %pattern, "No handler registered for pattern");
        return ReplyEnvelope::unknown_pattern(correlation_id, &pattern);
    };

    let started = Instant::now();
    let outcome = AssertUnwindSafe(handler.handle(payload)).catch_unwind().await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(result)) => {
            debug!(%correlation_id, pattern = %pattern, elapsed_ms, "Handled request");
            ReplyEnvelope::success(correlation_id, result)
        }
        Ok(Err(err)) => {
            debug!(%correlation_id, pattern = %pattern, elapsed_ms, kind = %err.kind, "Handler rejected request: {}", err.message);
            ReplyEnvelope::failure(correlation_id, err.kind, err.message)
        }
        Err(_) => {
            error!(%correlation_id, pattern = %pattern, handler = handler.name(), "Handler panicked");
            ReplyEnvelope::failure(correlation_id, "Internal", format!("Handler for {} panicked", pattern))
        }
    }
}

/// Decode, dispatch, reply, settle
async fn process_delivery(
    delivery: InboundMessage,
    registry: &PatternRegistry,
    broker: &dyn Broker,
) -> Result<()> {
    let reply = match RequestEnvelope::from_bytes(&delivery.body) {
        Ok(envelope) => {
            debug!(correlation_id = %envelope.correlation_id, "Processing request: {}", envelope.pattern);
            Some(dispatch(registry, envelope).await)
        }
        Err(e) => {
            error!("Undecodable request envelope: {}", e);
            delivery
                .correlation_id
                .as_deref()
                .and_then(|id| CorrelationId::parse(id).ok())
                .map(|id| ReplyEnvelope::failure(id, INVALID_ENVELOPE, e.to_string()))
        }
    };

    let (Some(reply), Some(reply_to)) = (reply, delivery.reply_to.as_deref()) else {
        warn!("Request has no reply destination; acknowledging without reply");
        delivery.ack().await?;
        return Ok(());
    };

    let message = OutboundMessage::new(reply.to_bytes()?)
        .with_correlation_id(reply.correlation_id.to_string());
    match broker.publish(reply_to, message).await {
        Ok(()) => {
            delivery.ack().await?;
            debug!(correlation_id = %reply.correlation_id, "Reply published and request acknowledged");
        }
        Err(e) => {
            error!(correlation_id = %reply.correlation_id, "Reply publish failed, requeueing request: {}", e);
            delivery.nack(true).await?;
        }
    }

    Ok(())
}
