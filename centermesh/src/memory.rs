//! In-process broker with the same queue semantics the RPC layer relies on:
//! named queues, one consumer each, ack/nack with requeue.
//!
//! Used by tests and single-process demos. `set_online(false)` makes every
//! operation fail the way an unreachable broker would.

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::broker::{Broker, DeliveryStream, InboundMessage, OutboundMessage, QueueOptions, Settlement};
use crate::error::{MeshError, Result};

struct MemoryQueue {
    options: QueueOptions,
    tx: mpsc::UnboundedSender<InboundMessage>,
    rx: Option<mpsc::UnboundedReceiver<InboundMessage>>,
}

impl MemoryQueue {
    fn new(options: QueueOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            options,
            tx,
            rx: Some(rx),
        }
    }
}

#[derive(Debug)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, MemoryQueue>>,
    online: Arc<AtomicBool>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate the broker going away or coming back
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.queues.lock().contains_key(queue)
    }

    pub fn queue_options(&self, queue: &str) -> Option<QueueOptions> {
        self.queues.lock().get(queue).map(|q| q.options)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MeshError::BrokerUnavailable("in-memory broker is offline".to_string()))
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryQueue")
            .field("options", &self.options)
            .field("consumed", &self.rx.is_none())
            .finish()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<()> {
        self.ensure_online()?;
        self.queues
            .lock()
            .entry(queue.to_string())
            .or_insert_with(|| MemoryQueue::new(options));
        debug!("Declared in-memory queue: {}", queue);
        Ok(())
    }

    async fn publish(&self, queue: &str, message: OutboundMessage) -> Result<()> {
        self.ensure_online()?;
        let mut queues = self.queues.lock();
        // The default exchange drops messages for undeclared queues
        let Some(target) = queues.get_mut(queue) else {
            debug!("Dropping message for undeclared queue: {}", queue);
            return Ok(());
        };

        let delivery = InboundMessage::new(
            message.body,
            message.correlation_id,
            message.reply_to,
            Settlement::Memory {
                requeue: target.tx.clone(),
                online: self.online.clone(),
            },
        );
        target
            .tx
            .send(delivery)
            .map_err(|_| MeshError::BrokerUnavailable(format!("queue '{}' is closed", queue)))
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        self.ensure_online()?;
        let rx = {
            let mut queues = self.queues.lock();
            let target = queues.get_mut(queue).ok_or_else(|| {
                MeshError::BrokerUnavailable(format!("queue '{}' was not declared", queue))
            })?;
            target.rx.take().ok_or_else(|| {
                MeshError::BrokerUnavailable(format!("queue '{}' already has a consumer", queue))
            })?
        };

        debug!("Created consumer {} for in-memory queue: {}", consumer_tag, queue);
        let deliveries = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|delivery| (Ok(delivery), rx))
        });
        Ok(deliveries.boxed())
    }

    async fn is_connected(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
