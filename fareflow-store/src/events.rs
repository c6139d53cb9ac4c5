use async_trait::async_trait;
use fareflow_core::notify::{ChannelKind, DeliveryError, NotificationChannel, OutboundNotification};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!("Sent message to {}/{}: partition {} offset {}", topic, key, delivery.partition, delivery.offset);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Email channel: hands the semantic payload to the mailer service through Kafka.
pub struct KafkaEmailChannel {
    producer: EventProducer,
    topic: String,
}

impl KafkaEmailChannel {
    pub fn new(producer: EventProducer, topic: &str) -> Self {
        Self {
            producer,
            topic: topic.to_string(),
        }
    }
}

#[async_trait]
impl NotificationChannel for KafkaEmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn deliver(&self, notification: &OutboundNotification) -> Result<(), DeliveryError> {
        let payload = serde_json::to_string(notification)
            .map_err(|e| DeliveryError::Encoding(e.to_string()))?;

        self.producer
            .publish(&self.topic, &notification.notification_id.to_string(), &payload)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}
