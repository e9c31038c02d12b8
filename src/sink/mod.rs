//! Transport adapters and the sink contract they satisfy.
//!
//! Each adapter owns one [`Publisher`](crate::publish::Publisher)
//! instance and supplies its network strategy through
//! [`BatchTransport`](crate::publish::BatchTransport); all buffering,
//! batching and retry behavior lives in the publisher core, never here.

pub mod kafka;
pub mod rabbitmq;

pub use kafka::KafkaSink;
pub use rabbitmq::RabbitSink;

use crate::config::{SinkConfig, TransportConfig};
use crate::encode::SinkEvent;
use crate::keytemplate::Tier;
use crate::model::{NormalizedMessage, PublishMeta};
use crate::publish::FilterFn;
use crate::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};

/// The publish/flush/close contract every transport adapter exposes.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Establishes the transport connection and, where configured,
    /// registers the tier schema. Must be called before `publish`.
    async fn start(&mut self) -> Result<()>;

    /// Fire-and-forget: failures are logged and retried internally,
    /// never returned to the caller.
    fn publish(&self, message: NormalizedMessage, meta: PublishMeta);

    /// Drains buffered events through the send pipeline.
    async fn flush(&self) -> Result<()>;

    /// Final flush, pipeline drain, transport teardown. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// Maps one sink configuration to a concrete adapter.
pub fn build(config: &SinkConfig) -> Result<Box<dyn EventSink>> {
    match &config.transport {
        TransportConfig::Kafka(_) => Ok(Box::new(KafkaSink::new(config)?)),
        TransportConfig::Rabbitmq(_) => Ok(Box::new(RabbitSink::new(config)?)),
    }
}

/// Allow-list filter from the sink's tier-appropriate include set, or
/// `None` when everything passes.
pub(crate) fn build_filter<E: SinkEvent>(config: &SinkConfig) -> Option<FilterFn<E>> {
    let allowed: Option<HashSet<String>> = match config.tier {
        Tier::Bronze => config
            .include_payload_cases
            .as_ref()
            .map(|cases| cases.iter().map(|c| c.as_str().to_string()).collect()),
        Tier::Silver => config
            .include_record_types
            .as_ref()
            .map(|types| types.iter().map(|t| t.as_str().to_string()).collect()),
    };
    allowed.map(|set| Box::new(move |event: &E| set.contains(event.kind())) as FilterFn<E>)
}

/// Transport-neutral header derivation: static headers, the kind label
/// under its tier-specific name, the data type, and (when a prefix is
/// configured, silver only) a namespaced projection of the event meta.
pub(crate) fn event_headers<E: SinkEvent>(
    event: &E,
    static_headers: &BTreeMap<String, String>,
    meta_prefix: Option<&str>,
) -> BTreeMap<String, String> {
    let mut headers = static_headers.clone();
    headers.insert(E::KIND_HEADER.to_string(), event.kind().to_string());
    headers.insert("dataType".to_string(), event.data_type().to_string());
    if let Some(prefix) = meta_prefix {
        for (k, v) in event.meta() {
            headers.insert(format!("{}{}", prefix, k), v.clone());
        }
    }
    headers
}

/// Wires a transport into a publisher core with the tier-appropriate
/// encoder and allow-list filter.
pub(crate) fn spawn_publisher<T>(
    config: &SinkConfig,
    key_template: Option<crate::keytemplate::KeyTemplate>,
    transport_label: &'static str,
    default_batch_size: usize,
    transport: T,
) -> crate::publish::Publisher
where
    T: crate::publish::BatchTransport<crate::encode::BronzeEvent>
        + crate::publish::BatchTransport<crate::encode::SilverEvent>,
{
    use crate::encode::{BronzeEncoder, BronzeEvent, SilverEncoder, SilverEvent};
    use crate::publish::{EncodeFn, Publisher};
    use std::time::Duration;

    let max_batch_size = config.max_batch_size.unwrap_or(default_batch_size);
    let max_batch_delay = Duration::from_millis(config.max_batch_delay_ms);
    let meta = route_meta(transport_label, config.tier);

    match config.tier {
        Tier::Bronze => {
            let encoder = BronzeEncoder::new(key_template, meta);
            let encode: EncodeFn<BronzeEvent> =
                Box::new(move |message, publish_meta| encoder.encode(message, publish_meta));
            Publisher::spawn(
                transport,
                encode,
                build_filter::<BronzeEvent>(config),
                max_batch_size,
                max_batch_delay,
            )
        }
        Tier::Silver => {
            let encoder = SilverEncoder::new(key_template, meta);
            let encode: EncodeFn<SilverEvent> =
                Box::new(move |message, publish_meta| encoder.encode(message, publish_meta));
            Publisher::spawn(
                transport,
                encode,
                build_filter::<SilverEvent>(config),
                max_batch_size,
                max_batch_delay,
            )
        }
    }
}

/// Groups a batch by destination in first-seen order, preserving event
/// order within each group. Used by adapters that fan one batch out
/// over several topics/exchanges.
pub(crate) fn group_by_destination<'a, E, F>(batch: &'a [E], destination_for: F) -> Vec<(&'a str, Vec<&'a E>)>
where
    E: SinkEvent,
    F: Fn(&'a E) -> &'a str,
{
    let mut groups: Vec<(&str, Vec<&E>)> = Vec::new();
    for event in batch {
        let destination = destination_for(event);
        match groups.iter_mut().find(|(d, _)| *d == destination) {
            Some((_, events)) => events.push(event),
            None => groups.push((destination, vec![event])),
        }
    }
    groups
}

/// Route metadata the encoders merge into every event's meta map.
pub(crate) fn route_meta(transport: &'static str, tier: Tier) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    meta.insert("transport".to_string(), transport.to_string());
    meta.insert("tier".to_string(), tier.as_str().to_string());
    meta
}
