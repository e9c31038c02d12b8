//! Protobuf wire messages for both tiers.
//!
//! Hand-written `prost` derives, no build-time codegen. The `.proto`
//! source text for each tier is kept alongside the structs because the
//! schema registry registration call ships it verbatim; the two must
//! stay in lockstep.

use std::collections::BTreeMap;

/// Wire provenance enum. `ORIGIN_REALTIME = 1`, `ORIGIN_REPLAY = 2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum Origin {
    Unspecified = 0,
    Realtime = 1,
    Replay = 2,
}

impl From<crate::model::Origin> for Origin {
    fn from(o: crate::model::Origin) -> Self {
        match o {
            crate::model::Origin::Realtime => Origin::Realtime,
            crate::model::Origin::Replay => Origin::Replay,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum Side {
    Unspecified = 0,
    Buy = 1,
    Sell = 2,
}

impl From<crate::model::TradeSide> for Side {
    fn from(s: crate::model::TradeSide) -> Self {
        match s {
            crate::model::TradeSide::Buy => Side::Buy,
            crate::model::TradeSide::Sell => Side::Sell,
            crate::model::TradeSide::Unknown => Side::Unspecified,
        }
    }
}

// ---------------------------------------------------------------------
// Bronze tier: one envelope, decimal strings preserved.
// ---------------------------------------------------------------------

/// One order-book price level, decimal strings as received upstream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PriceLevel {
    #[prost(string, tag = "1")]
    pub price: String,
    #[prost(string, tag = "2")]
    pub amount: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TradePayload {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub price: String,
    #[prost(string, tag = "3")]
    pub amount: String,
    #[prost(enumeration = "Side", tag = "4")]
    pub side: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BookChangePayload {
    #[prost(message, repeated, tag = "1")]
    pub bids: Vec<PriceLevel>,
    #[prost(message, repeated, tag = "2")]
    pub asks: Vec<PriceLevel>,
    #[prost(uint64, tag = "3")]
    pub sequence: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BookSnapshotPayload {
    #[prost(uint32, tag = "1")]
    pub depth: u32,
    #[prost(uint64, tag = "2")]
    pub interval_ms: u64,
    #[prost(message, repeated, tag = "3")]
    pub bids: Vec<PriceLevel>,
    #[prost(message, repeated, tag = "4")]
    pub asks: Vec<PriceLevel>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TradeBarPayload {
    #[prost(string, tag = "1")]
    pub kind: String,
    #[prost(uint64, tag = "2")]
    pub interval_ms: u64,
    #[prost(string, tag = "3")]
    pub open: String,
    #[prost(string, tag = "4")]
    pub high: String,
    #[prost(string, tag = "5")]
    pub low: String,
    #[prost(string, tag = "6")]
    pub close: String,
    #[prost(string, tag = "7")]
    pub volume: String,
    #[prost(uint64, tag = "8")]
    pub trades: u64,
    #[prost(int64, tag = "9")]
    pub open_timestamp_us: i64,
    #[prost(int64, tag = "10")]
    pub close_timestamp_us: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GroupedBookSnapshotPayload {
    #[prost(uint32, tag = "1")]
    pub depth: u32,
    #[prost(uint64, tag = "2")]
    pub interval_ms: u64,
    #[prost(string, tag = "3")]
    pub grouping: String,
    #[prost(bool, tag = "4")]
    pub remove_crossed_levels: bool,
    #[prost(uint64, tag = "5")]
    pub sequence: u64,
    #[prost(message, repeated, tag = "6")]
    pub bids: Vec<PriceLevel>,
    #[prost(message, repeated, tag = "7")]
    pub asks: Vec<PriceLevel>,
}

/// Upstream feed failure, carried through rather than dropped.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorPayload {
    #[prost(string, tag = "1")]
    pub details: String,
    #[prost(uint64, tag = "2")]
    pub subsequent_errors: u64,
}

/// Bronze envelope: one normalized event, largely as received.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NormalizedEvent {
    #[prost(string, tag = "1")]
    pub source: String,
    #[prost(string, tag = "2")]
    pub exchange: String,
    #[prost(string, tag = "3")]
    pub symbol: String,
    #[prost(int64, tag = "4")]
    pub timestamp_us: i64,
    #[prost(int64, tag = "5")]
    pub local_timestamp_us: i64,
    #[prost(int64, tag = "6")]
    pub ingest_timestamp_us: i64,
    #[prost(enumeration = "Origin", tag = "7")]
    pub origin: i32,
    #[prost(btree_map = "string, string", tag = "8")]
    pub meta: BTreeMap<String, String>,
    #[prost(oneof = "normalized_event::Payload", tags = "10, 11, 12, 13, 14, 15")]
    pub payload: Option<normalized_event::Payload>,
}

pub mod normalized_event {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "10")]
        Trade(super::TradePayload),
        #[prost(message, tag = "11")]
        BookChange(super::BookChangePayload),
        #[prost(message, tag = "12")]
        BookSnapshot(super::BookSnapshotPayload),
        #[prost(message, tag = "13")]
        TradeBar(super::TradeBarPayload),
        #[prost(message, tag = "14")]
        GroupedBookSnapshot(super::GroupedBookSnapshotPayload),
        #[prost(message, tag = "15")]
        Error(super::ErrorPayload),
    }
}

// ---------------------------------------------------------------------
// Silver tier: one message type per record type, E8 fixed-point fields.
// ---------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TradeRecord {
    #[prost(string, tag = "1")]
    pub exchange: String,
    #[prost(string, tag = "2")]
    pub symbol: String,
    #[prost(string, tag = "3")]
    pub trade_id: String,
    #[prost(sint64, tag = "4")]
    pub price_e8: i64,
    #[prost(sint64, tag = "5")]
    pub amount_e8: i64,
    #[prost(enumeration = "Side", tag = "6")]
    pub side: i32,
    #[prost(int64, tag = "7")]
    pub timestamp_us: i64,
    #[prost(int64, tag = "8")]
    pub local_timestamp_us: i64,
    #[prost(int64, tag = "9")]
    pub ingest_timestamp_us: i64,
    #[prost(enumeration = "Origin", tag = "10")]
    pub origin: i32,
}

/// One price level of a book change or snapshot. Snapshots set
/// `is_snapshot` and carry depth/interval of the originating snapshot.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BookLevelRecord {
    #[prost(string, tag = "1")]
    pub exchange: String,
    #[prost(string, tag = "2")]
    pub symbol: String,
    #[prost(enumeration = "Side", tag = "3")]
    pub side: i32,
    #[prost(sint64, tag = "4")]
    pub price_e8: i64,
    #[prost(sint64, tag = "5")]
    pub amount_e8: i64,
    #[prost(bool, tag = "6")]
    pub is_snapshot: bool,
    #[prost(uint32, tag = "7")]
    pub depth: u32,
    #[prost(uint64, tag = "8")]
    pub interval_ms: u64,
    #[prost(uint64, tag = "9")]
    pub sequence: u64,
    #[prost(int64, tag = "10")]
    pub timestamp_us: i64,
    #[prost(int64, tag = "11")]
    pub local_timestamp_us: i64,
    #[prost(int64, tag = "12")]
    pub ingest_timestamp_us: i64,
    #[prost(enumeration = "Origin", tag = "13")]
    pub origin: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TradeBarRecord {
    #[prost(string, tag = "1")]
    pub exchange: String,
    #[prost(string, tag = "2")]
    pub symbol: String,
    #[prost(string, tag = "3")]
    pub kind: String,
    #[prost(uint64, tag = "4")]
    pub interval_ms: u64,
    #[prost(sint64, tag = "5")]
    pub open_e8: i64,
    #[prost(sint64, tag = "6")]
    pub high_e8: i64,
    #[prost(sint64, tag = "7")]
    pub low_e8: i64,
    #[prost(sint64, tag = "8")]
    pub close_e8: i64,
    #[prost(sint64, tag = "9")]
    pub volume_e8: i64,
    #[prost(uint64, tag = "10")]
    pub trades: u64,
    #[prost(int64, tag = "11")]
    pub open_timestamp_us: i64,
    #[prost(int64, tag = "12")]
    pub close_timestamp_us: i64,
    #[prost(int64, tag = "13")]
    pub timestamp_us: i64,
    #[prost(int64, tag = "14")]
    pub local_timestamp_us: i64,
    #[prost(int64, tag = "15")]
    pub ingest_timestamp_us: i64,
    #[prost(enumeration = "Origin", tag = "16")]
    pub origin: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GroupedBookSnapshotRecord {
    #[prost(string, tag = "1")]
    pub exchange: String,
    #[prost(string, tag = "2")]
    pub symbol: String,
    #[prost(enumeration = "Side", tag = "3")]
    pub side: i32,
    #[prost(sint64, tag = "4")]
    pub price_e8: i64,
    #[prost(sint64, tag = "5")]
    pub amount_e8: i64,
    #[prost(sint64, tag = "6")]
    pub grouping_e8: i64,
    #[prost(uint32, tag = "7")]
    pub depth: u32,
    #[prost(uint64, tag = "8")]
    pub interval_ms: u64,
    #[prost(bool, tag = "9")]
    pub remove_crossed_levels: bool,
    #[prost(uint64, tag = "10")]
    pub sequence: u64,
    #[prost(int64, tag = "11")]
    pub timestamp_us: i64,
    #[prost(int64, tag = "12")]
    pub local_timestamp_us: i64,
    #[prost(int64, tag = "13")]
    pub ingest_timestamp_us: i64,
    #[prost(enumeration = "Origin", tag = "14")]
    pub origin: i32,
}

/// Proto source registered for bronze subjects.
pub const BRONZE_SCHEMA: &str = r#"syntax = "proto3";
package mdbus.bronze;

enum Origin {
  ORIGIN_UNSPECIFIED = 0;
  ORIGIN_REALTIME = 1;
  ORIGIN_REPLAY = 2;
}

enum Side {
  SIDE_UNSPECIFIED = 0;
  SIDE_BUY = 1;
  SIDE_SELL = 2;
}

message PriceLevel {
  string price = 1;
  string amount = 2;
}

message TradePayload {
  string id = 1;
  string price = 2;
  string amount = 3;
  Side side = 4;
}

message BookChangePayload {
  repeated PriceLevel bids = 1;
  repeated PriceLevel asks = 2;
  uint64 sequence = 3;
}

message BookSnapshotPayload {
  uint32 depth = 1;
  uint64 interval_ms = 2;
  repeated PriceLevel bids = 3;
  repeated PriceLevel asks = 4;
}

message TradeBarPayload {
  string kind = 1;
  uint64 interval_ms = 2;
  string open = 3;
  string high = 4;
  string low = 5;
  string close = 6;
  string volume = 7;
  uint64 trades = 8;
  int64 open_timestamp_us = 9;
  int64 close_timestamp_us = 10;
}

message GroupedBookSnapshotPayload {
  uint32 depth = 1;
  uint64 interval_ms = 2;
  string grouping = 3;
  bool remove_crossed_levels = 4;
  uint64 sequence = 5;
  repeated PriceLevel bids = 6;
  repeated PriceLevel asks = 7;
}

message ErrorPayload {
  string details = 1;
  uint64 subsequent_errors = 2;
}

message NormalizedEvent {
  string source = 1;
  string exchange = 2;
  string symbol = 3;
  int64 timestamp_us = 4;
  int64 local_timestamp_us = 5;
  int64 ingest_timestamp_us = 6;
  Origin origin = 7;
  map<string, string> meta = 8;
  oneof payload {
    TradePayload trade = 10;
    BookChangePayload book_change = 11;
    BookSnapshotPayload book_snapshot = 12;
    TradeBarPayload trade_bar = 13;
    GroupedBookSnapshotPayload grouped_book_snapshot = 14;
    ErrorPayload error = 15;
  }
}
"#;

/// Proto source registered for silver subjects.
pub const SILVER_SCHEMA: &str = r#"syntax = "proto3";
package mdbus.silver;

enum Origin {
  ORIGIN_UNSPECIFIED = 0;
  ORIGIN_REALTIME = 1;
  ORIGIN_REPLAY = 2;
}

enum Side {
  SIDE_UNSPECIFIED = 0;
  SIDE_BUY = 1;
  SIDE_SELL = 2;
}

message TradeRecord {
  string exchange = 1;
  string symbol = 2;
  string trade_id = 3;
  sint64 price_e8 = 4;
  sint64 amount_e8 = 5;
  Side side = 6;
  int64 timestamp_us = 7;
  int64 local_timestamp_us = 8;
  int64 ingest_timestamp_us = 9;
  Origin origin = 10;
}

message BookLevelRecord {
  string exchange = 1;
  string symbol = 2;
  Side side = 3;
  sint64 price_e8 = 4;
  sint64 amount_e8 = 5;
  bool is_snapshot = 6;
  uint32 depth = 7;
  uint64 interval_ms = 8;
  uint64 sequence = 9;
  int64 timestamp_us = 10;
  int64 local_timestamp_us = 11;
  int64 ingest_timestamp_us = 12;
  Origin origin = 13;
}

message TradeBarRecord {
  string exchange = 1;
  string symbol = 2;
  string kind = 3;
  uint64 interval_ms = 4;
  sint64 open_e8 = 5;
  sint64 high_e8 = 6;
  sint64 low_e8 = 7;
  sint64 close_e8 = 8;
  sint64 volume_e8 = 9;
  uint64 trades = 10;
  int64 open_timestamp_us = 11;
  int64 close_timestamp_us = 12;
  int64 timestamp_us = 13;
  int64 local_timestamp_us = 14;
  int64 ingest_timestamp_us = 15;
  Origin origin = 16;
}

message GroupedBookSnapshotRecord {
  string exchange = 1;
  string symbol = 2;
  Side side = 3;
  sint64 price_e8 = 4;
  sint64 amount_e8 = 5;
  sint64 grouping_e8 = 6;
  uint32 depth = 7;
  uint64 interval_ms = 8;
  bool remove_crossed_levels = 9;
  uint64 sequence = 10;
  int64 timestamp_us = 11;
  int64 local_timestamp_us = 12;
  int64 ingest_timestamp_us = 13;
  Origin origin = 14;
}
"#;
