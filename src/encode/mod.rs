//! Tier-specific event encoders and the wire types they produce.

pub mod bronze;
pub mod proto;
pub mod silver;

pub use bronze::{BronzeEncoder, BronzeEvent};
pub use silver::{SilverEncoder, SilverEvent};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifies the bronze envelope's payload variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadCase {
    Trade,
    BookChange,
    BookSnapshot,
    TradeBar,
    GroupedBookSnapshot,
    Error,
}

impl PayloadCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadCase::Trade => "trade",
            PayloadCase::BookChange => "book_change",
            PayloadCase::BookSnapshot => "book_snapshot",
            PayloadCase::TradeBar => "trade_bar",
            PayloadCase::GroupedBookSnapshot => "grouped_book_snapshot",
            PayloadCase::Error => "error",
        }
    }
}

/// Identifies a silver record's message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Trade,
    BookChange,
    BookSnapshot,
    TradeBar,
    GroupedBookSnapshot,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Trade => "trade",
            RecordType::BookChange => "book_change",
            RecordType::BookSnapshot => "book_snapshot",
            RecordType::TradeBar => "trade_bar",
            RecordType::GroupedBookSnapshot => "grouped_book_snapshot",
        }
    }
}

/// Uniform accessors the transport adapters need from an encoded event,
/// regardless of tier.
pub trait SinkEvent: Send + Sync + 'static {
    /// Header name the event's kind label is published under:
    /// `payloadCase` for bronze, `recordType` for silver.
    const KIND_HEADER: &'static str;

    fn key(&self) -> &str;
    fn binary(&self) -> &[u8];
    /// Payload-case or record-type label, snake_case.
    fn kind(&self) -> &'static str;
    fn data_type(&self) -> &str;
    fn meta(&self) -> &BTreeMap<String, String>;
}

/// Data-type string identifying the upstream subscription that produced
/// a message, e.g. `book_snapshot_25_100ms`. Carried in headers and
/// available to key templates.
pub(crate) fn data_type_of(msg: &crate::model::NormalizedMessage) -> String {
    use crate::model::NormalizedMessage::*;
    match msg {
        Trade(_) => "trade".to_string(),
        BookChange(_) => "book_change".to_string(),
        BookSnapshot(m) => format!("book_snapshot_{}_{}ms", m.depth, m.interval_ms),
        TradeBar(m) => format!("trade_bar_{}ms", m.interval_ms),
        GroupedBookSnapshot(m) => {
            format!("grouped_book_snapshot_{}_{}ms", m.grouping, m.interval_ms)
        }
        Error(_) => "error".to_string(),
    }
}

/// Microsecond epoch timestamp for wire records.
pub(crate) fn micros(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_micros()
}

/// Merges publish metadata into one ordered header map: route metadata
/// first, then per-request `extra_meta` (which wins on key collisions),
/// then request/session identifiers when present.
pub(crate) fn merged_meta(
    route_meta: &BTreeMap<String, String>,
    meta: &crate::model::PublishMeta,
) -> BTreeMap<String, String> {
    let mut out = route_meta.clone();
    for (k, v) in &meta.extra_meta {
        out.insert(k.clone(), v.clone());
    }
    if let Some(ref rid) = meta.request_id {
        out.insert("requestId".to_string(), rid.clone());
    }
    if let Some(ref sid) = meta.session_id {
        out.insert("sessionId".to_string(), sid.clone());
    }
    out
}
