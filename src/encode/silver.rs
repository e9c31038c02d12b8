//! Silver-tier encoder: re-expresses numeric fields as E8-scaled
//! integers and expands each message into one record per semantic
//! sub-entity (e.g. one record per book level).
//!
//! The scaling invariant: a decimal value `v` is stored as
//! `round(v * 10^8)`, so dividing the stored integer by 10^8 recovers
//! the original to 8 fractional digits.

use crate::encode::{data_type_of, merged_meta, micros, proto, RecordType, SinkEvent};
use crate::keytemplate::{KeyInputs, KeyTemplate};
use crate::model::{BookLevel, NormalizedMessage, PublishMeta};
use crate::{Error, Result};
use bytes::Bytes;
use prost::Message;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use tracing::debug;

const E8: i64 = 100_000_000;

/// Scales a decimal string to a fixed-point E8 integer, rounding the
/// midpoint away from zero. Parsing the string exactly (rather than
/// going through f64) absorbs binary-float representation error.
pub fn to_e8(value: &str) -> Result<i64> {
    let d: Decimal = value
        .parse()
        .map_err(|e| Error::Encoding(format!("invalid decimal '{}': {}", value, e)))?;
    d.checked_mul(Decimal::from(E8))
        .and_then(|scaled| {
            scaled
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
        })
        .ok_or_else(|| Error::Encoding(format!("decimal '{}' out of E8 range", value)))
}

/// One silver wire record, ready for a transport adapter.
#[derive(Debug, Clone)]
pub struct SilverEvent {
    pub key: String,
    pub binary: Bytes,
    pub record_type: RecordType,
    pub data_type: String,
    pub meta: BTreeMap<String, String>,
}

impl SinkEvent for SilverEvent {
    const KIND_HEADER: &'static str = "recordType";

    fn key(&self) -> &str {
        &self.key
    }
    fn binary(&self) -> &[u8] {
        &self.binary
    }
    fn kind(&self) -> &'static str {
        self.record_type.as_str()
    }
    fn data_type(&self) -> &str {
        &self.data_type
    }
    fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }
}

/// Stateless given its compiled key template; built once per sink.
pub struct SilverEncoder {
    key_template: Option<KeyTemplate>,
    route_meta: BTreeMap<String, String>,
}

struct RecordCtx<'a> {
    msg: &'a NormalizedMessage,
    meta: &'a PublishMeta,
    data_type: String,
    event_meta: BTreeMap<String, String>,
    ingest_us: i64,
    origin: i32,
}

impl SilverEncoder {
    pub fn new(key_template: Option<KeyTemplate>, route_meta: BTreeMap<String, String>) -> Self {
        Self {
            key_template,
            route_meta,
        }
    }

    /// Encodes one normalized message into zero or more silver records.
    /// Feed errors produce no silver records; they are a bronze-tier
    /// concern and are only logged here.
    pub fn encode(&self, msg: &NormalizedMessage, meta: &PublishMeta) -> Result<Vec<SilverEvent>> {
        let ctx = RecordCtx {
            msg,
            meta,
            data_type: data_type_of(msg),
            event_meta: merged_meta(&self.route_meta, meta),
            ingest_us: micros(&meta.ingest_timestamp),
            origin: proto::Origin::from(meta.origin) as i32,
        };

        match msg {
            NormalizedMessage::Trade(m) => {
                let record = proto::TradeRecord {
                    exchange: m.exchange.clone(),
                    symbol: m.symbol.clone(),
                    trade_id: m.id.clone().unwrap_or_default(),
                    price_e8: to_e8(&m.price)?,
                    amount_e8: to_e8(&m.amount)?,
                    side: proto::Side::from(m.side) as i32,
                    timestamp_us: micros(&m.timestamp),
                    local_timestamp_us: micros(&m.local_timestamp),
                    ingest_timestamp_us: ctx.ingest_us,
                    origin: ctx.origin,
                };
                Ok(vec![self.event(&ctx, RecordType::Trade, record.encode_to_vec())])
            }
            NormalizedMessage::BookChange(m) => self.book_levels(
                &ctx,
                RecordType::BookChange,
                &m.bids,
                &m.asks,
                false,
                0,
                0,
                m.sequence.unwrap_or(0),
                micros(&m.timestamp),
                micros(&m.local_timestamp),
            ),
            NormalizedMessage::BookSnapshot(m) => self.book_levels(
                &ctx,
                RecordType::BookSnapshot,
                &m.bids,
                &m.asks,
                true,
                m.depth,
                m.interval_ms,
                0,
                micros(&m.timestamp),
                micros(&m.local_timestamp),
            ),
            NormalizedMessage::TradeBar(m) => {
                let record = proto::TradeBarRecord {
                    exchange: m.exchange.clone(),
                    symbol: m.symbol.clone(),
                    kind: m.kind.clone(),
                    interval_ms: m.interval_ms,
                    open_e8: to_e8(&m.open)?,
                    high_e8: to_e8(&m.high)?,
                    low_e8: to_e8(&m.low)?,
                    close_e8: to_e8(&m.close)?,
                    volume_e8: to_e8(&m.volume)?,
                    trades: m.trades,
                    open_timestamp_us: micros(&m.open_timestamp),
                    close_timestamp_us: micros(&m.close_timestamp),
                    timestamp_us: micros(&m.timestamp),
                    local_timestamp_us: micros(&m.local_timestamp),
                    ingest_timestamp_us: ctx.ingest_us,
                    origin: ctx.origin,
                };
                Ok(vec![self.event(
                    &ctx,
                    RecordType::TradeBar,
                    record.encode_to_vec(),
                )])
            }
            NormalizedMessage::GroupedBookSnapshot(m) => {
                let grouping_e8 = to_e8(&m.grouping)?;
                let mut out = Vec::with_capacity(m.bids.len() + m.asks.len());
                for (side, level) in sided(&m.bids, &m.asks) {
                    let record = proto::GroupedBookSnapshotRecord {
                        exchange: m.exchange.clone(),
                        symbol: m.symbol.clone(),
                        side: side as i32,
                        price_e8: to_e8(&level.price)?,
                        amount_e8: to_e8(&level.amount)?,
                        grouping_e8,
                        depth: m.depth,
                        interval_ms: m.interval_ms,
                        remove_crossed_levels: m.remove_crossed_levels,
                        sequence: m.sequence.unwrap_or(0),
                        timestamp_us: micros(&m.timestamp),
                        local_timestamp_us: micros(&m.local_timestamp),
                        ingest_timestamp_us: ctx.ingest_us,
                        origin: ctx.origin,
                    };
                    out.push(self.event(
                        &ctx,
                        RecordType::GroupedBookSnapshot,
                        record.encode_to_vec(),
                    ));
                }
                Ok(out)
            }
            NormalizedMessage::Error(m) => {
                debug!(
                    exchange = %m.exchange,
                    details = %m.details,
                    "feed error has no silver representation, skipping"
                );
                Ok(Vec::new())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn book_levels(
        &self,
        ctx: &RecordCtx<'_>,
        record_type: RecordType,
        bids: &[BookLevel],
        asks: &[BookLevel],
        is_snapshot: bool,
        depth: u32,
        interval_ms: u64,
        sequence: u64,
        timestamp_us: i64,
        local_timestamp_us: i64,
    ) -> Result<Vec<SilverEvent>> {
        let mut out = Vec::with_capacity(bids.len() + asks.len());
        for (side, level) in sided(bids, asks) {
            let record = proto::BookLevelRecord {
                exchange: ctx.msg.exchange().to_string(),
                symbol: ctx.msg.symbol().to_string(),
                side: side as i32,
                price_e8: to_e8(&level.price)?,
                amount_e8: to_e8(&level.amount)?,
                is_snapshot,
                depth,
                interval_ms,
                sequence,
                timestamp_us,
                local_timestamp_us,
                ingest_timestamp_us: ctx.ingest_us,
                origin: ctx.origin,
            };
            out.push(self.event(ctx, record_type, record.encode_to_vec()));
        }
        Ok(out)
    }

    fn event(&self, ctx: &RecordCtx<'_>, record_type: RecordType, binary: Vec<u8>) -> SilverEvent {
        let key = match &self.key_template {
            Some(tpl) => tpl.resolve(&KeyInputs {
                exchange: ctx.msg.exchange(),
                symbol: ctx.msg.symbol(),
                origin: ctx.meta.origin,
                kind: record_type.as_str(),
                data_type: &ctx.data_type,
                meta: &ctx.event_meta,
            }),
            None => String::new(),
        };
        SilverEvent {
            key,
            binary: Bytes::from(binary),
            record_type,
            data_type: ctx.data_type.clone(),
            meta: ctx.event_meta.clone(),
        }
    }
}

/// Bid levels first (BUY), then ask levels (SELL), each in book order.
fn sided<'a>(
    bids: &'a [BookLevel],
    asks: &'a [BookLevel],
) -> impl Iterator<Item = (proto::Side, &'a BookLevel)> {
    bids.iter()
        .map(|l| (proto::Side::Buy, l))
        .chain(asks.iter().map(|l| (proto::Side::Sell, l)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keytemplate::Tier;
    use crate::model::{BookChange, Origin, Trade, TradeSide};
    use chrono::Utc;

    fn meta() -> PublishMeta {
        PublishMeta::new("md-bus/test", Origin::Realtime)
    }

    fn trade(price: &str, amount: &str) -> NormalizedMessage {
        NormalizedMessage::Trade(Trade {
            exchange: "binance".to_string(),
            symbol: "btcusdt".to_string(),
            id: None,
            price: price.to_string(),
            amount: amount.to_string(),
            side: TradeSide::Sell,
            timestamp: Utc::now(),
            local_timestamp: Utc::now(),
        })
    }

    #[test]
    fn e8_scaling_vectors() {
        assert_eq!(to_e8("50000").unwrap(), 5_000_000_000_000);
        assert_eq!(to_e8("1").unwrap(), 100_000_000);
        assert_eq!(to_e8("50001").unwrap(), 5_000_100_000_000);
        assert_eq!(to_e8("0.5").unwrap(), 50_000_000);
        assert_eq!(to_e8("0.00000001").unwrap(), 1);
        assert_eq!(to_e8("-2.5").unwrap(), -250_000_000);
    }

    #[test]
    fn e8_rounds_sub_scale_digits() {
        // rounding, not truncation
        assert_eq!(to_e8("0.000000015").unwrap(), 2);
        assert_eq!(to_e8("0.000000014").unwrap(), 1);
    }

    #[test]
    fn e8_rejects_garbage() {
        assert!(matches!(to_e8("not-a-number"), Err(Error::Encoding(_))));
    }

    #[test]
    fn e8_rejects_out_of_range_values() {
        // Parseable, but the scaled value overflows the decimal
        // mantissa; must be an error, never a panic.
        assert!(matches!(
            to_e8("10000000000000000000000"),
            Err(Error::Encoding(_))
        ));
        // Fits the mantissa but not i64 after scaling.
        assert!(matches!(
            to_e8("100000000000"),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn trade_scales_price_and_amount() {
        let enc = SilverEncoder::new(None, BTreeMap::new());
        let events = enc.encode(&trade("50000", "1"), &meta()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].record_type, RecordType::Trade);

        let rec = proto::TradeRecord::decode(events[0].binary.as_ref()).unwrap();
        assert_eq!(rec.price_e8, 5_000_000_000_000);
        assert_eq!(rec.amount_e8, 100_000_000);
        assert_eq!(rec.origin, proto::Origin::Realtime as i32);
        assert_eq!(rec.side, proto::Side::Sell as i32);
    }

    #[test]
    fn book_change_expands_per_level_with_sides() {
        let enc = SilverEncoder::new(None, BTreeMap::new());
        let msg = NormalizedMessage::BookChange(BookChange {
            exchange: "binance".to_string(),
            symbol: "btcusdt".to_string(),
            bids: vec![BookLevel {
                price: "50000".to_string(),
                amount: "1".to_string(),
            }],
            asks: vec![BookLevel {
                price: "50001".to_string(),
                amount: "0.5".to_string(),
            }],
            sequence: Some(42),
            timestamp: Utc::now(),
            local_timestamp: Utc::now(),
        });

        let events = enc.encode(&msg, &meta()).unwrap();
        assert_eq!(events.len(), 2);

        let bid = proto::BookLevelRecord::decode(events[0].binary.as_ref()).unwrap();
        assert_eq!(bid.side, proto::Side::Buy as i32);
        assert_eq!(bid.price_e8, 5_000_000_000_000);
        assert_eq!(bid.amount_e8, 100_000_000);
        assert_eq!(bid.sequence, 42);
        assert!(!bid.is_snapshot);

        let ask = proto::BookLevelRecord::decode(events[1].binary.as_ref()).unwrap();
        assert_eq!(ask.side, proto::Side::Sell as i32);
        assert_eq!(ask.price_e8, 5_000_100_000_000);
        assert_eq!(ask.amount_e8, 50_000_000);
    }

    #[test]
    fn grouped_snapshot_expands_per_level_with_grouping() {
        let enc = SilverEncoder::new(None, BTreeMap::new());
        let msg = NormalizedMessage::GroupedBookSnapshot(crate::model::GroupedBookSnapshot {
            exchange: "deribit".to_string(),
            symbol: "btc-perpetual".to_string(),
            depth: 10,
            interval_ms: 1000,
            grouping: "0.5".to_string(),
            remove_crossed_levels: true,
            sequence: Some(7),
            bids: vec![BookLevel {
                price: "50000".to_string(),
                amount: "1".to_string(),
            }],
            asks: vec![BookLevel {
                price: "50001".to_string(),
                amount: "1".to_string(),
            }],
            timestamp: Utc::now(),
            local_timestamp: Utc::now(),
        });

        let events = enc.encode(&msg, &meta()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].record_type, RecordType::GroupedBookSnapshot);

        let bid = proto::GroupedBookSnapshotRecord::decode(events[0].binary.as_ref()).unwrap();
        assert_eq!(bid.side, proto::Side::Buy as i32);
        assert_eq!(bid.grouping_e8, 50_000_000);
        assert_eq!(bid.depth, 10);
        assert!(bid.remove_crossed_levels);
        assert_eq!(bid.sequence, 7);

        let ask = proto::GroupedBookSnapshotRecord::decode(events[1].binary.as_ref()).unwrap();
        assert_eq!(ask.side, proto::Side::Sell as i32);
    }

    #[test]
    fn error_messages_yield_no_records() {
        let enc = SilverEncoder::new(None, BTreeMap::new());
        let msg = NormalizedMessage::Error(crate::model::FeedError {
            exchange: "deribit".to_string(),
            symbol: None,
            details: "reset".to_string(),
            subsequent_errors: 0,
            timestamp: Utc::now(),
        });
        assert!(enc.encode(&msg, &meta()).unwrap().is_empty());
    }

    #[test]
    fn record_key_uses_record_type() {
        let tpl = KeyTemplate::compile("{{recordType}}:{{symbol}}", Tier::Silver).unwrap();
        let enc = SilverEncoder::new(Some(tpl), BTreeMap::new());
        let events = enc.encode(&trade("1", "1"), &meta()).unwrap();
        assert_eq!(events[0].key, "trade:btcusdt");
    }
}
