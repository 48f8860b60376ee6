//! The seam between the RPC layer and the message broker.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{MeshError, Result};

/// Stream of deliveries from one queue
pub type DeliveryStream = BoxStream<'static, Result<InboundMessage>>;

/// Queue declaration flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

impl QueueOptions {
    /// Options for a service's request channel
    pub fn channel(durable: bool) -> Self {
        Self {
            durable,
            ..Self::default()
        }
    }

    /// Options for a client's private reply queue
    pub fn reply_queue() -> Self {
        Self {
            durable: false,
            exclusive: true,
            auto_delete: true,
        }
    }
}

/// A message to publish on a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
}

impl OutboundMessage {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            correlation_id: None,
            reply_to: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

/// How a delivery is settled with its broker
pub(crate) enum Settlement {
    Amqp(lapin::acker::Acker),
    Memory {
        requeue: mpsc::UnboundedSender<InboundMessage>,
        online: Arc<AtomicBool>,
    },
}

/// A message received from a queue; must be acked or nacked
pub struct InboundMessage {
    pub body: Vec<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    settlement: Settlement,
}

impl InboundMessage {
    pub(crate) fn new(
        body: Vec<u8>,
        correlation_id: Option<String>,
        reply_to: Option<String>,
        settlement: Settlement,
    ) -> Self {
        Self {
            body,
            correlation_id,
            reply_to,
            settlement,
        }
    }

    /// Acknowledge the delivery
    pub async fn ack(&self) -> Result<()> {
        match &self.settlement {
            Settlement::Amqp(acker) => {
                acker.ack(BasicAckOptions::default()).await?;
            }
            Settlement::Memory { .. } => {}
        }
        Ok(())
    }

    /// Reject the delivery, optionally putting it back on its queue
    pub async fn nack(&self, requeue: bool) -> Result<()> {
        match &self.settlement {
            Settlement::Amqp(acker) => {
                acker
                    .nack(BasicNackOptions {
                        multiple: false,
                        requeue,
                    })
                    .await?;
            }
            Settlement::Memory { online, .. } if !online.load(Ordering::SeqCst) => {
                return Err(MeshError::BrokerUnavailable("in-memory broker is offline".to_string()));
            }
            Settlement::Memory { requeue: queue, online } if requeue => {
                let copy = InboundMessage::new(
                    self.body.clone(),
                    self.correlation_id.clone(),
                    self.reply_to.clone(),
                    Settlement::Memory {
                        requeue: queue.clone(),
                        online: online.clone(),
                    },
                );
                queue
                    .send(copy)
                    .map_err(|_| MeshError::BrokerUnavailable("queue was deleted".to_string()))?;
            }
            Settlement::Memory { .. } => {}
        }
        Ok(())
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("bytes", &self.body.len())
            .field("correlation_id", &self.correlation_id)
            .field("reply_to", &self.reply_to)
            .finish()
    }
}

/// Queue-oriented broker operations used by clients and workers
#[async_trait]
pub trait Broker: Send + Sync + fmt::Debug {
    /// Declare a queue; declaring an existing queue with the same flags is a no-op
    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<()>;

    /// Publish to a queue through the default exchange
    async fn publish(&self, queue: &str, message: OutboundMessage) -> Result<()>;

    /// Start consuming a queue
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    /// Check if the broker connection is healthy
    async fn is_connected(&self) -> bool;
}
