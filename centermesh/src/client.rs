use futures_util::StreamExt;
use std::sync::{Arc, Weak};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::{Broker, DeliveryStream, OutboundMessage, QueueOptions};
use crate::channel::ChannelRegistry;
use crate::error::{Result, RpcError};
use crate::message::{ReplyEnvelope, RequestEnvelope};
use crate::pending::{PendingCalls, PendingStats};
use crate::settings::RpcSettings;

/// Correlated request/reply client.
///
/// This is what the gateway uses to reach workers, and what a worker uses to
/// reach another worker:
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use centermesh::{ChannelRegistry, MemoryBroker, RpcClient, RpcSettings};
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let channels = Arc::new(ChannelRegistry::new(centermesh::channel::default_channels())?);
/// let broker = Arc::new(MemoryBroker::new());
/// let client = RpcClient::start("api_gateway", broker, channels, &RpcSettings::default()).await?;
/// let user = client
///     .call_default("user_service", "user.get", serde_json::json!(1))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RpcClient {
    broker: Arc<dyn Broker>,
    channels: Arc<ChannelRegistry>,
    pending: Arc<PendingCalls>,
    client_name: String,
    reply_queue: String,
    default_timeout: Duration,
}

impl RpcClient {
    /// Declare this client's reply queue and start the reply processor and
    /// the pending-call sweeper. Returns once replies can be received.
    pub async fn start(
        client_name: impl Into<String>,
        broker: Arc<dyn Broker>,
        channels: Arc<ChannelRegistry>,
        settings: &RpcSettings,
    ) -> Result<Self> {
        let client_name = client_name.into();
        let reply_queue = format!("centermesh.{}.replies.{}", client_name, Uuid::new_v4().simple());

        broker.declare_queue(&reply_queue, QueueOptions::reply_queue()).await?;
        let consumer_tag = format!("{}-replies-{}", client_name, Uuid::new_v4());
        let replies = broker.consume(&reply_queue, &consumer_tag).await?;

        let pending = Arc::new(PendingCalls::new());
        tokio::spawn(process_replies(replies, pending.clone(), client_name.clone()));
        tokio::spawn(sweep_expired(Arc::downgrade(&pending), settings.sweep_interval()));

        info!("RPC client {} ready, replies on {}", client_name, reply_queue);
        Ok(Self {
            broker,
            channels,
            pending,
            client_name,
            reply_queue,
            default_timeout: settings.default_timeout(),
        })
    }

    /// Call a pattern on a service and wait for its correlated reply.
    ///
    /// Dropping the returned future cancels the call: its pending entry is
    /// removed and a reply arriving later is discarded.
    pub async fn call(
        &self,
        service: &str,
        pattern: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> std::result::Result<serde_json::Value, RpcError> {
        let channel = self.channels.get(service).ok_or_else(|| RpcError::Unroutable {
            target: service.to_string(),
        })?;

        let (correlation_id, mut result_rx) = self.pending.register(service, pattern, timeout);
        let _guard = self.pending.guard(correlation_id);

        let request = RequestEnvelope::new(pattern, payload, correlation_id);
        let body = request
            .to_bytes()
            .map_err(|e| RpcError::TransportUnavailable(e.to_string()))?;
        let message = OutboundMessage::new(body)
            .with_correlation_id(correlation_id.to_string())
            .with_reply_to(self.reply_queue.clone());

        if let Err(e) = self.broker.publish(&channel.channel_name, message).await {
            error!(%correlation_id, service, pattern, "Publish failed: {}", e);
            return Err(RpcError::TransportUnavailable(e.to_string()));
        }

        debug!(
            %correlation_id,
            "Client {} sent {} to {} ({})",
            self.client_name, pattern, service, channel.channel_name
        );

        match tokio::time::timeout(timeout, &mut result_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::Cancelled),
            Err(_) => {
                // A reply that won the race against the deadline is still delivered
                if !self.pending.time_out(&correlation_id) {
                    if let Ok(outcome) = result_rx.try_recv() {
                        return outcome;
                    }
                }
                let timeout_ms = timeout.as_millis() as u64;
                warn!(%correlation_id, service, pattern, timeout_ms, "RPC call timed out");
                Err(RpcError::Timeout { timeout_ms })
            }
        }
    }

    /// Call with the configured default timeout
    pub async fn call_default(
        &self,
        service: &str,
        pattern: &str,
        payload: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, RpcError> {
        self.call(service, pattern, payload, self.default_timeout).await
    }

    pub fn name(&self) -> &str {
        &self.client_name
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    /// Check if client is connected and healthy
    pub async fn is_healthy(&self) -> bool {
        self.broker.is_connected().await
    }

    /// Get client statistics
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            client_name: self.client_name.clone(),
            reply_queue: self.reply_queue.clone(),
            default_timeout_ms: self.default_timeout.as_millis() as u64,
            pending: self.pending.stats(),
        }
    }
}

/// Client statistics for monitoring
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClientStats {
    pub client_name: String,
    pub reply_queue: String,
    pub default_timeout_ms: u64,
    pub pending: PendingStats,
}

/// Feed every reply on the client's queue to the pending-call table
async fn process_replies(mut replies: DeliveryStream, pending: Arc<PendingCalls>, client_name: String) {
    debug!("Reply processor started for client: {}", client_name);

    while let Some(delivery) = replies.next().await {
        match delivery {
            Ok(delivery) => {
                match ReplyEnvelope::from_bytes(&delivery.body) {
                    Ok(reply) => {
                        pending.resolve(reply);
                    }
                    Err(e) => {
                        error!("Error deserializing reply: {}", e);
                    }
                }

                if let Err(e) = delivery.ack().await {
                    error!("Failed to acknowledge reply: {}", e);
                }
            }
            Err(e) => {
                error!("Error receiving reply: {}", e);
            }
        }
    }

    warn!("Reply processor stopped for client: {}", client_name);
}

/// Periodically purge overdue calls until the client is gone
async fn sweep_expired(pending: Weak<PendingCalls>, every: Duration) {
    let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let Some(pending) = pending.upgrade() else {
            break;
        };
        let removed = pending.expire(Instant::now());
        if removed > 0 {
            debug!(removed, "Swept expired pending calls");
        }
    }
}
