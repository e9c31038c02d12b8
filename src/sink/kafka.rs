//! Topic-routed Kafka adapter.
//!
//! Events are grouped by destination topic (default topic plus
//! per-kind overrides), sent one at a time awaiting broker
//! acknowledgement so order within the batch is preserved. When a
//! schema registry is configured, `start()` registers the tier's proto
//! schema and every payload is framed with the standard 5-byte marker.

use crate::config::{KafkaSinkConfig, SinkConfig, TransportConfig};
use crate::encode::{proto, SinkEvent};
use crate::keytemplate::{KeyTemplate, Tier};
use crate::model::{NormalizedMessage, PublishMeta};
use crate::publish::{BatchTransport, Publisher};
use crate::schema_registry::{frame, SchemaRegistryClient};
use crate::sink::{event_headers, group_by_destination, spawn_publisher, EventSink};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// Kafka sinks default to modest batches; the broker client coalesces
/// further via linger.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

pub struct KafkaSink {
    tier: Tier,
    config: SinkConfig,
    kafka: KafkaSinkConfig,
    key_template: Option<KeyTemplate>,
    producer: FutureProducer,
    publisher: Option<Publisher>,
}

impl KafkaSink {
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let TransportConfig::Kafka(kafka) = &config.transport else {
            return Err(Error::Config(
                "KafkaSink requires a kafka transport block".to_string(),
            ));
        };

        let key_template = config
            .key_template
            .as_deref()
            .map(|t| KeyTemplate::compile(t, config.tier))
            .transpose()?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", kafka.brokers.join(","))
            .set("compression.type", &kafka.compression)
            .set("acks", &kafka.acks)
            .set("linger.ms", kafka.linger_ms.to_string())
            .create()?;

        Ok(Self {
            tier: config.tier,
            config: config.clone(),
            kafka: kafka.clone(),
            key_template,
            producer,
            publisher: None,
        })
    }
}

#[async_trait]
impl EventSink for KafkaSink {
    async fn start(&mut self) -> Result<()> {
        if self.publisher.is_some() {
            return Ok(());
        }

        let schema_id = match &self.kafka.schema_registry {
            Some(registry) => {
                let schema = match self.tier {
                    Tier::Bronze => proto::BRONZE_SCHEMA,
                    Tier::Silver => proto::SILVER_SCHEMA,
                };
                let client = SchemaRegistryClient::new(registry);
                Some(client.register(&self.kafka.topic, schema).await?)
            }
            None => None,
        };

        let transport = KafkaTransport {
            producer: self.producer.clone(),
            default_topic: self.kafka.topic.clone(),
            topic_overrides: self.kafka.topic_overrides.clone(),
            static_headers: self.config.static_headers.clone(),
            meta_prefix: match self.tier {
                Tier::Silver => self.config.meta_headers_prefix.clone(),
                Tier::Bronze => None,
            },
            schema_id,
        };

        self.publisher = Some(spawn_publisher(
            &self.config,
            self.key_template.clone(),
            "kafka",
            DEFAULT_MAX_BATCH_SIZE,
            transport,
        ));
        info!(
            tier = self.tier.as_str(),
            topic = %self.kafka.topic,
            schema_id = ?schema_id,
            "kafka sink started"
        );
        Ok(())
    }

    fn publish(&self, message: NormalizedMessage, meta: PublishMeta) {
        match &self.publisher {
            Some(publisher) => publisher.publish(message, meta),
            None => warn!("kafka sink publish before start, dropping message"),
        }
    }

    async fn flush(&self) -> Result<()> {
        match &self.publisher {
            Some(publisher) => publisher.flush().await,
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Tear the producer down even when the drain fails, and report
        // the drain error over the teardown error.
        let drained = match &self.publisher {
            Some(publisher) => publisher.close().await,
            None => Ok(()),
        };
        let flushed = self
            .producer
            .flush(Duration::from_secs(5))
            .map_err(Error::Kafka);
        drained.and(flushed)
    }
}

struct KafkaTransport {
    producer: FutureProducer,
    default_topic: String,
    topic_overrides: BTreeMap<String, String>,
    static_headers: BTreeMap<String, String>,
    meta_prefix: Option<String>,
    schema_id: Option<u32>,
}

impl KafkaTransport {
    fn topic_for(&self, kind: &str) -> &str {
        self.topic_overrides
            .get(kind)
            .map(String::as_str)
            .unwrap_or(&self.default_topic)
    }
}

#[async_trait]
impl<E: SinkEvent> BatchTransport<E> for KafkaTransport {
    async fn send_batch(&self, batch: &[E]) -> Result<()> {
        for (topic, events) in group_by_destination(batch, |e| self.topic_for(e.kind())) {
            for event in events {
                let payload: Bytes = match self.schema_id {
                    Some(id) => frame(id, event.binary()),
                    None => Bytes::copy_from_slice(event.binary()),
                };
                let headers = owned_headers(&event_headers(
                    event,
                    &self.static_headers,
                    self.meta_prefix.as_deref(),
                ));
                let record = FutureRecord::to(topic)
                    .key(event.key())
                    .payload(payload.as_ref())
                    .headers(headers);

                self.producer
                    .send(record, rdkafka::util::Timeout::Never)
                    .await
                    .map_err(|(e, _)| Error::Kafka(e))?;
            }
        }
        Ok(())
    }
}

fn owned_headers(map: &BTreeMap<String, String>) -> OwnedHeaders {
    let mut headers = OwnedHeaders::new_with_capacity(map.len());
    for (key, value) in map {
        headers = headers.insert(Header {
            key,
            value: Some(value.as_str()),
        });
    }
    headers
}
