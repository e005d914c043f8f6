mod error;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

pub use error::{BrokerError, Result};

const RETRY_HEADER: &str = "x-retry";
const CONSUMER_HEARTBEAT_SECS: u16 = 600;
const PRODUCER_HEARTBEAT_SECS: u16 = 300;

fn dlq_exchange(exchange: &str) -> String {
    format!("{exchange}.dlq")
}

fn safe_routing_key(routing_key: &str) -> String {
    routing_key.replace('.', "_").replace('*', "all")
}

fn queue_name(service: &str, exchange: &str, routing_key: &str) -> String {
    format!("{service}.{exchange}.{}.queue", safe_routing_key(routing_key))
}

async fn declare_topic_exchange(channel: &Channel, name: &str) -> Result<()> {
    channel
        .exchange_declare(
            name,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

/// Publishes JSON-encoded messages to durable topic exchanges. Exchange declarations
/// are cached per connection since a topic exchange only needs declaring once.
pub struct BrokerProducer {
    connection: Connection,
    channel: Channel,
    declared_exchanges: Mutex<HashSet<String>>,
}

impl BrokerProducer {
    pub async fn connect(amqp_url: &str) -> Result<Self> {
        let connection = Connection::connect(
            amqp_url,
            ConnectionProperties::default().with_connection_name(
                format!("audio-producer;heartbeat={PRODUCER_HEARTBEAT_SECS}").into(),
            ),
        )
        .await?;
        let channel = connection.create_channel().await?;

        tracing::info!("broker_producer_connected");
        Ok(Self {
            connection,
            channel,
            declared_exchanges: Mutex::new(HashSet::new()),
        })
    }

    pub async fn publish<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &T,
    ) -> Result<()> {
        self.ensure_declared(exchange).await?;

        let body = serde_json::to_vec(message)?;
        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await?;
        confirm.await?;

        tracing::debug!(exchange, routing_key, "published_message");
        Ok(())
    }

    async fn ensure_declared(&self, exchange: &str) -> Result<()> {
        let mut declared = self.declared_exchanges.lock().await;
        if declared.contains(exchange) {
            return Ok(());
        }
        declare_topic_exchange(&self.channel, exchange).await?;
        declared.insert(exchange.to_string());
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }
}

/// Outcome of one message handler invocation, driving the retry/DLQ decision.
pub enum HandlerOutcome {
    Ack,
    /// Transient failure: retry up to the configured cap, then route to the DLQ.
    Retry(String),
}

pub type HandlerResult = std::result::Result<HandlerOutcome, String>;

/// Subscribes `service` to `exchange`/`routing_key` on a dedicated durable queue,
/// with a parallel DLQ bound to `{exchange}.dlq`, prefetch = 1, and manual ack.
///
/// `handler` runs once per delivered, successfully-decoded message. Returning
/// `Err` or `Ok(HandlerOutcome::Retry(reason))` both drive the retry/DLQ path;
/// the distinction exists so callers can report a reason string either way.
pub async fn subscribe<T, F, Fut>(
    amqp_url: &str,
    service: &str,
    exchange: &str,
    routing_key: &str,
    max_retries: u32,
    handler: F,
) -> Result<()>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send,
{
    let connection = Connection::connect(
        amqp_url,
        ConnectionProperties::default().with_connection_name(
            format!("audio-consumer:{service};heartbeat={CONSUMER_HEARTBEAT_SECS}").into(),
        ),
    )
    .await?;
    let channel = connection.create_channel().await?;
    channel
        .basic_qos(1, BasicQosOptions::default())
        .await?;

    declare_topic_exchange(&channel, exchange).await?;
    let dlq_exchange_name = dlq_exchange(exchange);
    declare_topic_exchange(&channel, &dlq_exchange_name).await?;

    let queue = queue_name(service, exchange, routing_key);
    let dlq_queue = queue_name(service, &dlq_exchange_name, routing_key);

    channel
        .queue_declare(
            &queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            &queue,
            exchange,
            routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_declare(
            &dlq_queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            &dlq_queue,
            &dlq_exchange_name,
            routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    tracing::info!(queue = %queue, dlq_queue = %dlq_queue, exchange, routing_key, "broker_subscribed");

    let mut consumer = channel
        .basic_consume(
            &queue,
            &format!("{service}-consumer"),
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    let channel = Arc::new(channel);
    let handler = Arc::new(handler);
    let routing_key = routing_key.to_string();
    let exchange = exchange.to_string();

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;
        let channel = channel.clone();
        let handler = handler.clone();
        let exchange = exchange.clone();
        let dlq_exchange_name = dlq_exchange_name.clone();
        let routing_key = routing_key.clone();
        let queue = queue.clone();

        let retry_count = current_retry(&delivery.properties);

        let parsed: std::result::Result<T, serde_json::Error> =
            serde_json::from_slice(&delivery.data);

        let outcome: HandlerResult = match parsed {
            Ok(message) => handler(message).await,
            Err(e) => Err(format!("undecodable message body: {e}")),
        };

        match outcome {
            Ok(HandlerOutcome::Ack) => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    tracing::error!(error = %e, queue = %queue, "ack_failed");
                }
            }
            Ok(HandlerOutcome::Retry(reason)) | Err(reason) => {
                tracing::warn!(queue = %queue, retry_count, reason = %reason, "handler_failed");
                let republished = if retry_count < max_retries {
                    republish_with_retry(
                        &channel,
                        &exchange,
                        &routing_key,
                        &delivery.data,
                        retry_count + 1,
                    )
                    .await
                } else {
                    tracing::error!(queue = %queue, retry_count, "routing_to_dlq");
                    republish_with_retry(
                        &channel,
                        &dlq_exchange_name,
                        &routing_key,
                        &delivery.data,
                        retry_count,
                    )
                    .await
                };

                match republished {
                    Ok(()) => {
                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            tracing::error!(error = %e, queue = %queue, "ack_after_republish_failed");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, queue = %queue, "republish_failed");
                        if let Err(e) = delivery
                            .reject(BasicRejectOptions { requeue: false })
                            .await
                        {
                            tracing::error!(error = %e, queue = %queue, "reject_failed");
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn current_retry(properties: &BasicProperties) -> u32 {
    properties
        .headers()
        .as_ref()
        .and_then(|headers| headers.inner().get(RETRY_HEADER))
        .and_then(|value| match value {
            AMQPValue::LongInt(v) => Some(*v as u32),
            AMQPValue::LongUInt(v) => Some(*v),
            AMQPValue::ShortInt(v) => Some(*v as u32),
            AMQPValue::ShortUInt(v) => Some(*v as u32),
            _ => None,
        })
        .unwrap_or(0)
}

async fn republish_with_retry(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    body: &[u8],
    retry_count: u32,
) -> Result<()> {
    let mut headers = FieldTable::default();
    headers.insert(RETRY_HEADER.into(), AMQPValue::LongUInt(retry_count));

    let confirm = channel
        .basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            body,
            BasicProperties::default()
                .with_content_type("application/json".into())
                .with_delivery_mode(2)
                .with_headers(headers),
        )
        .await?;
    confirm.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_name_matches_external_interface_naming() {
        assert_eq!(
            queue_name("orchestrator", "worker_events", "recognize.done"),
            "orchestrator.worker_events.recognize_done.queue"
        );
    }

    #[test]
    fn wildcard_routing_key_is_sanitized() {
        assert_eq!(safe_routing_key("cmd.*"), "cmd_all");
    }

    #[test]
    fn dlq_exchange_name_has_dlq_suffix() {
        assert_eq!(dlq_exchange("audio_ops"), "audio_ops.dlq");
    }
}
