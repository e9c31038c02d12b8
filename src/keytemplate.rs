//! Routing/partition-key template compiler.
//!
//! A template like `"{{exchange}}.{{symbol}}"` is compiled once at sink
//! construction into a [`KeyTemplate`], which performs pure string
//! substitution at encode time. Compilation validates every placeholder
//! up front so misconfiguration fails at startup, not mid-stream.
//!
//! Recognized placeholders: `exchange`, `symbol`, `origin`, `dataType`,
//! `payloadCase` (bronze sinks), `recordType` (silver sinks), and
//! `meta.<key>` where `<key>` is `[A-Za-z0-9_]+`.

use crate::{Error, Result};
use crate::model::Origin;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which representation a sink publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Near-raw encoding, decimal strings preserved.
    Bronze,
    /// Derived encoding, E8-scaled integers, one record per sub-entity.
    Silver,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Exchange,
    Symbol,
    Origin,
    /// Payload case (bronze) or record type (silver) label.
    Kind,
    DataType,
    Meta(String),
}

/// Inputs a compiled template resolves against, borrowed from the event
/// being encoded.
#[derive(Debug, Clone, Copy)]
pub struct KeyInputs<'a> {
    pub exchange: &'a str,
    pub symbol: &'a str,
    pub origin: Origin,
    /// Payload-case or record-type label, depending on tier.
    pub kind: &'a str,
    pub data_type: &'a str,
    pub meta: &'a BTreeMap<String, String>,
}

/// A compiled key template. Cheap to clone, safe to share across encode
/// calls; resolution has no side effects.
#[derive(Debug, Clone)]
pub struct KeyTemplate {
    segments: Vec<Segment>,
}

impl KeyTemplate {
    /// Compiles `template` for a sink of the given tier.
    ///
    /// Fails with [`Error::Config`] on an empty template, an unknown
    /// placeholder (named in the error), or a malformed `meta.` key.
    pub fn compile(template: &str, tier: Tier) -> Result<Self> {
        if template.is_empty() {
            return Err(Error::Config("key template must not be empty".to_string()));
        }

        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| {
                Error::Config(format!(
                    "unterminated placeholder in key template '{}'",
                    template
                ))
            })?;
            let token = after[..close].trim();
            segments.push(Self::parse_placeholder(token, tier)?);
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    fn parse_placeholder(token: &str, tier: Tier) -> Result<Segment> {
        match token {
            "exchange" => return Ok(Segment::Exchange),
            "symbol" => return Ok(Segment::Symbol),
            "origin" => return Ok(Segment::Origin),
            "dataType" => return Ok(Segment::DataType),
            "payloadCase" if tier == Tier::Bronze => return Ok(Segment::Kind),
            "recordType" if tier == Tier::Silver => return Ok(Segment::Kind),
            _ => {}
        }

        if let Some(key) = token.strip_prefix("meta.") {
            if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(Error::Config(format!(
                    "invalid meta key in placeholder {{{{{}}}}}: expected [A-Za-z0-9_]+",
                    token
                )));
            }
            return Ok(Segment::Meta(key.to_string()));
        }

        Err(Error::Config(format!(
            "unknown placeholder {{{{{}}}}} in key template",
            token
        )))
    }

    /// Resolves the template against one event's inputs.
    ///
    /// A `meta.` placeholder whose key is absent resolves to the empty
    /// string rather than failing; missing metadata is a per-event
    /// condition, not a configuration error.
    pub fn resolve(&self, inputs: &KeyInputs<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Exchange => out.push_str(inputs.exchange),
                Segment::Symbol => out.push_str(inputs.symbol),
                Segment::Origin => out.push_str(inputs.origin.as_str()),
                Segment::Kind => out.push_str(inputs.kind),
                Segment::DataType => out.push_str(inputs.data_type),
                Segment::Meta(key) => {
                    if let Some(v) = inputs.meta.get(key) {
                        out.push_str(v);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs<'a>(meta: &'a BTreeMap<String, String>) -> KeyInputs<'a> {
        KeyInputs {
            exchange: "binance",
            symbol: "btcusdt",
            origin: Origin::Replay,
            kind: "trade",
            data_type: "trade",
            meta,
        }
    }

    #[test]
    fn resolves_exchange_symbol() {
        let meta = BTreeMap::new();
        let tpl = KeyTemplate::compile("{{exchange}}.{{symbol}}", Tier::Silver).unwrap();
        assert_eq!(tpl.resolve(&inputs(&meta)), "binance.btcusdt");
    }

    #[test]
    fn resolves_all_placeholders() {
        let mut meta = BTreeMap::new();
        meta.insert("shard".to_string(), "7".to_string());
        let tpl = KeyTemplate::compile(
            "{{origin}}/{{recordType}}/{{dataType}}/{{meta.shard}}",
            Tier::Silver,
        )
        .unwrap();
        assert_eq!(tpl.resolve(&inputs(&meta)), "replay/trade/trade/7");
    }

    #[test]
    fn payload_case_is_bronze_only() {
        assert!(KeyTemplate::compile("{{payloadCase}}", Tier::Bronze).is_ok());
        assert!(KeyTemplate::compile("{{payloadCase}}", Tier::Silver).is_err());
        assert!(KeyTemplate::compile("{{recordType}}", Tier::Silver).is_ok());
        assert!(KeyTemplate::compile("{{recordType}}", Tier::Bronze).is_err());
    }

    #[test]
    fn empty_template_is_config_error() {
        let err = KeyTemplate::compile("", Tier::Bronze).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unknown_placeholder_is_named() {
        let err = KeyTemplate::compile("{{unknown}}", Tier::Bronze).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("{{unknown}}"), "got: {}", msg);
    }

    #[test]
    fn invalid_meta_key_rejected() {
        let err = KeyTemplate::compile("{{meta.invalid-key}}", Tier::Bronze).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("meta.invalid-key"));
    }

    #[test]
    fn unterminated_placeholder_rejected() {
        let err = KeyTemplate::compile("{{exchange", Tier::Bronze).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_meta_key_resolves_empty() {
        let meta = BTreeMap::new();
        let tpl = KeyTemplate::compile("k-{{meta.shard}}", Tier::Bronze).unwrap();
        assert_eq!(tpl.resolve(&inputs(&meta)), "k-");
    }

    #[test]
    fn literal_only_template() {
        let meta = BTreeMap::new();
        let tpl = KeyTemplate::compile("static-key", Tier::Bronze).unwrap();
        assert_eq!(tpl.resolve(&inputs(&meta)), "static-key");
    }
}
