use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    options::*,
    types::FieldTable,
    BasicProperties, Channel, Connection,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, DeliveryStream, InboundMessage, OutboundMessage, QueueOptions, Settlement};
use crate::error::{MeshError, Result};

/// Tuning for the AMQP connection; the broker URL comes from the channel registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Number of connection attempts at startup
    pub max_retries: u32,
    /// Delay between retry attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Channel prefetch count for load balancing
    pub prefetch_count: u16,
    /// Idle channels kept for reuse
    pub channel_pool_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay_ms: 1_000,
            prefetch_count: 10,
            channel_pool_size: 10,
        }
    }
}

/// AMQP broker backed by lapin, with a channel pool.
///
/// `connect()` retries with a fixed delay; once running, a lost connection
/// is re-established with a single attempt per operation.
pub struct ConnectionManager {
    url: String,
    config: ConnectionConfig,
    connection: Arc<RwLock<Option<Arc<Connection>>>>,
    channels: Arc<Mutex<Vec<Channel>>>,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>, config: ConnectionConfig) -> Self {
        Self {
            url: url.into(),
            config,
            connection: Arc::new(RwLock::new(None)),
            channels: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Establish connection to RabbitMQ with retry logic
    pub async fn connect(&self) -> Result<()> {
        let mut attempts = 0;

        loop {
            match self.try_connect().await {
                Ok(connection) => {
                    info!("Connected to RabbitMQ at {}", self.url);
                    *self.connection.write().await = Some(Arc::new(connection));
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.config.max_retries {
                        error!("Failed to connect to RabbitMQ after {} attempts: {}", attempts, e);
                        return Err(e);
                    }

                    warn!(
                        "Connection attempt {} failed, retrying in {}ms: {}",
                        attempts, self.config.retry_delay_ms, e
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
            }
        }
    }

    async fn try_connect(&self) -> Result<Connection> {
        debug!("Attempting to connect to {}", self.url);

        let connection = Connection::connect(
            &self.url,
            lapin::ConnectionProperties::default()
                .with_connection_name(format!("centermesh-{}", uuid::Uuid::new_v4()).into()),
        )
        .await?;

        Ok(connection)
    }

    /// Get or create a channel
    async fn get_channel(&self) -> Result<Channel> {
        {
            let mut channels = self.channels.lock().await;
            while let Some(channel) = channels.pop() {
                if channel.status().connected() {
                    return Ok(channel);
                }
            }
        }

        let connection = self.ensure_connected().await?;
        let channel = connection.create_channel().await?;
        channel
            .basic_qos(self.config.prefetch_count, BasicQosOptions::default())
            .await?;

        debug!("Created new channel");
        Ok(channel)
    }

    /// Return channel to pool for reuse
    async fn return_channel(&self, channel: Channel) {
        if channel.status().connected() {
            let mut channels = self.channels.lock().await;
            if channels.len() < self.config.channel_pool_size {
                channels.push(channel);
            }
        }
    }

    async fn ensure_connected(&self) -> Result<Arc<Connection>> {
        {
            let connection_guard = self.connection.read().await;
            if let Some(connection) = connection_guard.as_ref() {
                if connection.status().connected() {
                    return Ok(connection.clone());
                }
            }
        }

        warn!("Connection to {} lost, attempting to reconnect", self.url);
        let connection = Arc::new(
            self.try_connect()
                .await
                .map_err(|e| MeshError::BrokerUnavailable(e.to_string()))?,
        );
        *self.connection.write().await = Some(connection.clone());
        Ok(connection)
    }

    /// Get connection statistics for monitoring
    pub async fn get_stats(&self) -> ConnectionStats {
        ConnectionStats {
            is_connected: self.is_connected().await,
            channel_pool_size: self.channels.lock().await.len(),
            url: self.url.clone(),
        }
    }
}

#[async_trait]
impl Broker for ConnectionManager {
    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<()> {
        let channel = self.get_channel().await?;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: options.durable,
                    exclusive: options.exclusive,
                    auto_delete: options.auto_delete,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        self.return_channel(channel).await;
        debug!("Declared queue: {}", queue);
        Ok(())
    }

    async fn publish(&self, queue: &str, message: OutboundMessage) -> Result<()> {
        let channel = self.get_channel().await?;

        let mut properties = BasicProperties::default().with_content_type("application/json".to_string().into());
        if let Some(correlation_id) = message.correlation_id {
            properties = properties.with_correlation_id(correlation_id.into());
        }
        if let Some(reply_to) = message.reply_to {
            properties = properties.with_reply_to(reply_to.into());
        }

        channel
            .basic_publish("", queue, BasicPublishOptions::default(), &message.body, properties)
            .await?
            .await?;

        self.return_channel(channel).await;
        debug!("Published message to queue: {}", queue);
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        // Consumer channels stay out of the pool for the consumer's lifetime
        let channel = self.get_channel().await?;

        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    exclusive: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        debug!("Created consumer {} for queue: {}", consumer_tag, queue);
        let stream = consumer.map(|delivery| -> Result<InboundMessage> {
            let delivery = delivery?;
            let correlation_id = delivery
                .properties
                .correlation_id()
                .as_ref()
                .map(|id| id.as_str().to_string());
            let reply_to = delivery
                .properties
                .reply_to()
                .as_ref()
                .map(|queue| queue.as_str().to_string());
            Ok(InboundMessage::new(
                delivery.data,
                correlation_id,
                reply_to,
                Settlement::Amqp(delivery.acker),
            ))
        });
        Ok(stream.boxed())
    }

    async fn is_connected(&self) -> bool {
        self.connection
            .read()
            .await
            .as_ref()
            .map(|conn| conn.status().connected())
            .unwrap_or(false)
    }
}

/// Connection statistics for monitoring
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionStats {
    pub is_connected: bool,
    pub channel_pool_size: usize,
    pub url: String,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.url)
            .field("config", &self.config)
            .finish()
    }
}
