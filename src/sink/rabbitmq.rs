//! Exchange-routed RabbitMQ adapter.
//!
//! Events are grouped by destination exchange (default exchange plus
//! per-kind overrides) and published with the compiled key template as
//! routing key. Publisher confirms are awaited per message so broker
//! rejections surface to the retry logic instead of vanishing.

use crate::config::{RabbitSinkConfig, SinkConfig, TransportConfig};
use crate::encode::SinkEvent;
use crate::keytemplate::{KeyTemplate, Tier};
use crate::model::{NormalizedMessage, PublishMeta};
use crate::publish::{BatchTransport, Publisher};
use crate::sink::{event_headers, group_by_destination, spawn_publisher, EventSink};
use crate::{Error, Result};
use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// AMQP messages are small; larger batches amortize the confirm
/// round-trips.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 256;

pub struct RabbitSink {
    tier: Tier,
    config: SinkConfig,
    rabbit: RabbitSinkConfig,
    key_template: Option<KeyTemplate>,
    connection: Option<Connection>,
    publisher: Option<Publisher>,
}

impl RabbitSink {
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let TransportConfig::Rabbitmq(rabbit) = &config.transport else {
            return Err(Error::Config(
                "RabbitSink requires a rabbitmq transport block".to_string(),
            ));
        };

        let key_template = config
            .key_template
            .as_deref()
            .map(|t| KeyTemplate::compile(t, config.tier))
            .transpose()?;

        Ok(Self {
            tier: config.tier,
            config: config.clone(),
            rabbit: rabbit.clone(),
            key_template,
            connection: None,
            publisher: None,
        })
    }

    async fn declare_exchanges(&self, channel: &Channel) -> Result<()> {
        let mut exchanges: BTreeSet<&str> = BTreeSet::new();
        exchanges.insert(self.rabbit.exchange.as_str());
        exchanges.extend(self.rabbit.exchange_overrides.values().map(String::as_str));

        for exchange in exchanges {
            channel
                .exchange_declare(
                    exchange,
                    ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventSink for RabbitSink {
    async fn start(&mut self) -> Result<()> {
        if self.publisher.is_some() {
            return Ok(());
        }

        let connection =
            Connection::connect(&self.rabbit.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        if self.rabbit.declare_exchanges {
            self.declare_exchanges(&channel).await?;
        }

        let transport = RabbitTransport {
            channel,
            default_exchange: self.rabbit.exchange.clone(),
            exchange_overrides: self.rabbit.exchange_overrides.clone(),
            static_headers: self.config.static_headers.clone(),
            meta_prefix: match self.tier {
                Tier::Silver => self.config.meta_headers_prefix.clone(),
                Tier::Bronze => None,
            },
        };

        self.publisher = Some(spawn_publisher(
            &self.config,
            self.key_template.clone(),
            "rabbitmq",
            DEFAULT_MAX_BATCH_SIZE,
            transport,
        ));
        self.connection = Some(connection);
        info!(
            tier = self.tier.as_str(),
            exchange = %self.rabbit.exchange,
            "rabbitmq sink started"
        );
        Ok(())
    }

    fn publish(&self, message: NormalizedMessage, meta: PublishMeta) {
        match &self.publisher {
            Some(publisher) => publisher.publish(message, meta),
            None => warn!("rabbitmq sink publish before start, dropping message"),
        }
    }

    async fn flush(&self) -> Result<()> {
        match &self.publisher {
            Some(publisher) => publisher.flush().await,
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Close the connection even when the drain fails, and report
        // the drain error over the teardown error.
        let drained = match &self.publisher {
            Some(publisher) => publisher.close().await,
            None => Ok(()),
        };
        let closed = match self.connection.take() {
            Some(connection) => connection.close(200, "closing").await.map_err(Error::Rabbit),
            None => Ok(()),
        };
        drained.and(closed)
    }
}

struct RabbitTransport {
    channel: Channel,
    default_exchange: String,
    exchange_overrides: BTreeMap<String, String>,
    static_headers: BTreeMap<String, String>,
    meta_prefix: Option<String>,
}

impl RabbitTransport {
    fn exchange_for(&self, kind: &str) -> &str {
        self.exchange_overrides
            .get(kind)
            .map(String::as_str)
            .unwrap_or(&self.default_exchange)
    }
}

#[async_trait]
impl<E: SinkEvent> BatchTransport<E> for RabbitTransport {
    async fn send_batch(&self, batch: &[E]) -> Result<()> {
        for (exchange, events) in group_by_destination(batch, |e| self.exchange_for(e.kind())) {
            for event in events {
                let headers = field_table(&event_headers(
                    event,
                    &self.static_headers,
                    self.meta_prefix.as_deref(),
                ));
                let properties = BasicProperties::default()
                    .with_content_type("application/x-protobuf".into())
                    .with_headers(headers);

                let confirm = self
                    .channel
                    .basic_publish(
                        exchange,
                        event.key(),
                        BasicPublishOptions::default(),
                        event.binary(),
                        properties,
                    )
                    .await?
                    .await?;

                if let Confirmation::Nack(_) = confirm {
                    return Err(Error::Transport(format!(
                        "broker nacked message on exchange '{}'",
                        exchange
                    )));
                }
            }
        }
        Ok(())
    }
}

fn field_table(map: &BTreeMap<String, String>) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in map {
        table.insert(
            key.as_str().into(),
            AMQPValue::LongString(value.as_str().into()),
        );
    }
    table
}
