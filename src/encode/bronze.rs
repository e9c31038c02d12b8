//! Bronze-tier encoder: serializes a normalized message largely as
//! received into the `NormalizedEvent` protobuf envelope. Decimal
//! strings are preserved verbatim for audit fidelity.

use crate::encode::{data_type_of, merged_meta, micros, proto, PayloadCase, SinkEvent};
use crate::keytemplate::{KeyInputs, KeyTemplate};
use crate::model::{BookLevel, NormalizedMessage, PublishMeta};
use crate::Result;
use bytes::Bytes;
use prost::Message;
use std::collections::BTreeMap;

/// One bronze wire record, ready for a transport adapter.
#[derive(Debug, Clone)]
pub struct BronzeEvent {
    pub key: String,
    pub binary: Bytes,
    pub payload_case: PayloadCase,
    pub data_type: String,
    pub meta: BTreeMap<String, String>,
}

impl SinkEvent for BronzeEvent {
    const KIND_HEADER: &'static str = "payloadCase";

    fn key(&self) -> &str {
        &self.key
    }
    fn binary(&self) -> &[u8] {
        &self.binary
    }
    fn kind(&self) -> &'static str {
        self.payload_case.as_str()
    }
    fn data_type(&self) -> &str {
        &self.data_type
    }
    fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }
}

/// Stateless given its compiled key template; built once per sink.
pub struct BronzeEncoder {
    key_template: Option<KeyTemplate>,
    /// Transport/route metadata merged into every event's meta map.
    route_meta: BTreeMap<String, String>,
}

impl BronzeEncoder {
    pub fn new(key_template: Option<KeyTemplate>, route_meta: BTreeMap<String, String>) -> Self {
        Self {
            key_template,
            route_meta,
        }
    }

    /// Encodes one normalized message into bronze events. Always exactly
    /// one event per message; the allow-list filter applied downstream
    /// may drop it.
    pub fn encode(&self, msg: &NormalizedMessage, meta: &PublishMeta) -> Result<Vec<BronzeEvent>> {
        let data_type = data_type_of(msg);
        let (payload_case, payload) = build_payload(msg);
        let event_meta = merged_meta(&self.route_meta, meta);

        let key = match &self.key_template {
            Some(tpl) => tpl.resolve(&KeyInputs {
                exchange: msg.exchange(),
                symbol: msg.symbol(),
                origin: meta.origin,
                kind: payload_case.as_str(),
                data_type: &data_type,
                meta: &event_meta,
            }),
            None => String::new(),
        };

        let envelope = proto::NormalizedEvent {
            source: meta.source.clone(),
            exchange: msg.exchange().to_string(),
            symbol: msg.symbol().to_string(),
            timestamp_us: message_timestamp(msg),
            local_timestamp_us: local_timestamp(msg),
            ingest_timestamp_us: micros(&meta.ingest_timestamp),
            origin: proto::Origin::from(meta.origin) as i32,
            meta: event_meta.clone(),
            payload: Some(payload),
        };

        Ok(vec![BronzeEvent {
            key,
            binary: Bytes::from(envelope.encode_to_vec()),
            payload_case,
            data_type,
            meta: event_meta,
        }])
    }
}

fn levels(src: &[BookLevel]) -> Vec<proto::PriceLevel> {
    src.iter()
        .map(|l| proto::PriceLevel {
            price: l.price.clone(),
            amount: l.amount.clone(),
        })
        .collect()
}

fn build_payload(msg: &NormalizedMessage) -> (PayloadCase, proto::normalized_event::Payload) {
    use proto::normalized_event::Payload;
    match msg {
        NormalizedMessage::Trade(m) => (
            PayloadCase::Trade,
            Payload::Trade(proto::TradePayload {
                id: m.id.clone().unwrap_or_default(),
                price: m.price.clone(),
                amount: m.amount.clone(),
                side: proto::Side::from(m.side) as i32,
            }),
        ),
        NormalizedMessage::BookChange(m) => (
            PayloadCase::BookChange,
            Payload::BookChange(proto::BookChangePayload {
                bids: levels(&m.bids),
                asks: levels(&m.asks),
                sequence: m.sequence.unwrap_or(0),
            }),
        ),
        NormalizedMessage::BookSnapshot(m) => (
            PayloadCase::BookSnapshot,
            Payload::BookSnapshot(proto::BookSnapshotPayload {
                depth: m.depth,
                interval_ms: m.interval_ms,
                bids: levels(&m.bids),
                asks: levels(&m.asks),
            }),
        ),
        NormalizedMessage::TradeBar(m) => (
            PayloadCase::TradeBar,
            Payload::TradeBar(proto::TradeBarPayload {
                kind: m.kind.clone(),
                interval_ms: m.interval_ms,
                open: m.open.clone(),
                high: m.high.clone(),
                low: m.low.clone(),
                close: m.close.clone(),
                volume: m.volume.clone(),
                trades: m.trades,
                open_timestamp_us: micros(&m.open_timestamp),
                close_timestamp_us: micros(&m.close_timestamp),
            }),
        ),
        NormalizedMessage::GroupedBookSnapshot(m) => (
            PayloadCase::GroupedBookSnapshot,
            Payload::GroupedBookSnapshot(proto::GroupedBookSnapshotPayload {
                depth: m.depth,
                interval_ms: m.interval_ms,
                grouping: m.grouping.clone(),
                remove_crossed_levels: m.remove_crossed_levels,
                sequence: m.sequence.unwrap_or(0),
                bids: levels(&m.bids),
                asks: levels(&m.asks),
            }),
        ),
        NormalizedMessage::Error(m) => (
            PayloadCase::Error,
            Payload::Error(proto::ErrorPayload {
                details: m.details.clone(),
                subsequent_errors: m.subsequent_errors,
            }),
        ),
    }
}

fn message_timestamp(msg: &NormalizedMessage) -> i64 {
    match msg {
        NormalizedMessage::Trade(m) => micros(&m.timestamp),
        NormalizedMessage::BookChange(m) => micros(&m.timestamp),
        NormalizedMessage::BookSnapshot(m) => micros(&m.timestamp),
        NormalizedMessage::TradeBar(m) => micros(&m.timestamp),
        NormalizedMessage::GroupedBookSnapshot(m) => micros(&m.timestamp),
        NormalizedMessage::Error(m) => micros(&m.timestamp),
    }
}

fn local_timestamp(msg: &NormalizedMessage) -> i64 {
    match msg {
        NormalizedMessage::Trade(m) => micros(&m.local_timestamp),
        NormalizedMessage::BookChange(m) => micros(&m.local_timestamp),
        NormalizedMessage::BookSnapshot(m) => micros(&m.local_timestamp),
        NormalizedMessage::TradeBar(m) => micros(&m.local_timestamp),
        NormalizedMessage::GroupedBookSnapshot(m) => micros(&m.local_timestamp),
        // Feed errors carry a single timestamp.
        NormalizedMessage::Error(m) => micros(&m.timestamp),
    }
}
