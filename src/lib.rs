//! Market-data event bus.
//!
//! Ingests normalized market-data events and forwards them to external
//! message transports in two representations: a bronze tier that keeps
//! the event close to its original shape, and a silver tier decomposed
//! into compact fixed-point records. Delivery is ordered and
//! at-least-once, with bounded batching latency.

pub mod config;
pub mod error;
pub mod keytemplate;
pub mod model;
pub mod publish;
pub mod schema_registry;

pub mod encode;
pub mod sink;

pub use config::Config;
pub use error::{Error, Result};
pub use keytemplate::{KeyInputs, KeyTemplate, Tier};
pub use model::{NormalizedMessage, Origin, PublishMeta};
pub use publish::{BatchTransport, Publisher};
pub use sink::EventSink;
