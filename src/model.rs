//! Normalized market-data message types and publish metadata.
//!
//! [`NormalizedMessage`] is the hand-off format produced by the replay or
//! streaming gateway. Prices and quantities arrive as decimal strings so
//! that the bronze tier can preserve them verbatim; the silver encoder is
//! responsible for fixed-point normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provenance of an event: live feed or historical reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[default]
    Realtime,
    Replay,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Realtime => "realtime",
            Origin::Replay => "replay",
        }
    }
}

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
    Unknown,
}

/// One price level of an order book, decimal strings as received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: String,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub exchange: String,
    pub symbol: String,
    #[serde(default)]
    pub id: Option<String>,
    pub price: String,
    pub amount: String,
    pub side: TradeSide,
    pub timestamp: DateTime<Utc>,
    pub local_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookChange {
    pub exchange: String,
    pub symbol: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    #[serde(default)]
    pub sequence: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub local_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub exchange: String,
    pub symbol: String,
    pub depth: u32,
    pub interval_ms: u64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub timestamp: DateTime<Utc>,
    pub local_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeBar {
    pub exchange: String,
    pub symbol: String,
    /// Bar aggregation kind: "time", "volume" or "tick".
    pub kind: String,
    pub interval_ms: u64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub trades: u64,
    pub open_timestamp: DateTime<Utc>,
    pub close_timestamp: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub local_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupedBookSnapshot {
    pub exchange: String,
    pub symbol: String,
    pub depth: u32,
    pub interval_ms: u64,
    /// Price grouping step, decimal string.
    pub grouping: String,
    #[serde(default)]
    pub remove_crossed_levels: bool,
    #[serde(default)]
    pub sequence: Option<u64>,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub timestamp: DateTime<Utc>,
    pub local_timestamp: DateTime<Utc>,
}

/// Upstream feed error. Never dropped silently; the bronze tier encodes
/// these as a dedicated error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedError {
    pub exchange: String,
    #[serde(default)]
    pub symbol: Option<String>,
    pub details: String,
    #[serde(default)]
    pub subsequent_errors: u64,
    pub timestamp: DateTime<Utc>,
}

/// Tagged union over all normalized market-data kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedMessage {
    Trade(Trade),
    BookChange(BookChange),
    BookSnapshot(BookSnapshot),
    TradeBar(TradeBar),
    GroupedBookSnapshot(GroupedBookSnapshot),
    Error(FeedError),
}

impl NormalizedMessage {
    pub fn exchange(&self) -> &str {
        match self {
            NormalizedMessage::Trade(m) => &m.exchange,
            NormalizedMessage::BookChange(m) => &m.exchange,
            NormalizedMessage::BookSnapshot(m) => &m.exchange,
            NormalizedMessage::TradeBar(m) => &m.exchange,
            NormalizedMessage::GroupedBookSnapshot(m) => &m.exchange,
            NormalizedMessage::Error(m) => &m.exchange,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            NormalizedMessage::Trade(m) => &m.symbol,
            NormalizedMessage::BookChange(m) => &m.symbol,
            NormalizedMessage::BookSnapshot(m) => &m.symbol,
            NormalizedMessage::TradeBar(m) => &m.symbol,
            NormalizedMessage::GroupedBookSnapshot(m) => &m.symbol,
            NormalizedMessage::Error(m) => m.symbol.as_deref().unwrap_or(""),
        }
    }

    /// Stable snake_case label used for logging and routing.
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizedMessage::Trade(_) => "trade",
            NormalizedMessage::BookChange(_) => "book_change",
            NormalizedMessage::BookSnapshot(_) => "book_snapshot",
            NormalizedMessage::TradeBar(_) => "trade_bar",
            NormalizedMessage::GroupedBookSnapshot(_) => "grouped_book_snapshot",
            NormalizedMessage::Error(_) => "error",
        }
    }
}

/// Metadata injected alongside every published message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishMeta {
    /// Tag identifying this process/version, e.g. `md-bus/0.1.0`.
    pub source: String,
    pub origin: Origin,
    pub ingest_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Free-form string pairs merged into output headers/attributes.
    #[serde(default)]
    pub extra_meta: BTreeMap<String, String>,
}

impl PublishMeta {
    pub fn new(source: impl Into<String>, origin: Origin) -> Self {
        Self {
            source: source.into(),
            origin,
            ingest_timestamp: Utc::now(),
            request_id: None,
            session_id: None,
            extra_meta: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_union_round_trip() {
        let json = r#"{
            "type": "trade",
            "exchange": "binance",
            "symbol": "btcusdt",
            "price": "50000",
            "amount": "1",
            "side": "buy",
            "timestamp": "2024-01-01T00:00:00Z",
            "local_timestamp": "2024-01-01T00:00:00.000123Z"
        }"#;

        let msg: NormalizedMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind(), "trade");
        assert_eq!(msg.exchange(), "binance");
        assert_eq!(msg.symbol(), "btcusdt");

        let back = serde_json::to_string(&msg).unwrap();
        assert!(back.contains(r#""type":"trade""#));
    }

    #[test]
    fn error_without_symbol() {
        let json = r#"{
            "type": "error",
            "exchange": "deribit",
            "details": "connection reset",
            "timestamp": "2024-01-01T00:00:00Z"
        }"#;

        let msg: NormalizedMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind(), "error");
        assert_eq!(msg.symbol(), "");
    }
}
