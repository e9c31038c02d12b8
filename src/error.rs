//! Error types and result handling for md-bus.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use md_bus::{Error, Result};
//!
//! fn compile_template() -> Result<()> {
//!     // Simulating a bad key template
//!     Err(Error::Config("unknown placeholder: {{bogus}}".to_string()))
//! }
//!
//! match compile_template() {
//!     Ok(()) => println!("Compiled"),
//!     Err(Error::Config(msg)) => eprintln!("Config error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for md-bus operations.
///
/// This enum represents all possible errors that can occur while
/// encoding and publishing market-data events, from compile-time
/// misconfiguration to transport-level send failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error: bad key template, invalid sink options,
    /// or a malformed config file. Fatal at construction time.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A normalized message could not be encoded into wire records.
    /// The message's events are dropped and the error is logged.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Kafka client or producer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// RabbitMQ client or channel error.
    #[error("RabbitMQ error: {0}")]
    Rabbit(#[from] lapin::Error),

    /// Generic transport rejection not tied to a specific client,
    /// e.g. a broker negative-acking a published message.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Schema registry registration failed. Fails `start()` outright.
    #[error("Schema registry error: {0}")]
    SchemaRegistry(String),

    /// HTTP error talking to the schema registry.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization error when decoding ingest messages.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically from reading the ingest stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The publisher was asked to operate after `close()`.
    #[error("Publisher closed")]
    Closed,
}

/// A convenient Result type alias for md-bus operations.
///
/// This is equivalent to `std::result::Result<T, md_bus::Error>`.
///
/// # Example
///
/// ```rust
/// use md_bus::Result;
///
/// fn do_something() -> Result<String> {
///     Ok("Success".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;
