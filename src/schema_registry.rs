//! Confluent-style schema registry client and wire framing.
//!
//! On `start()` a sink may register its tier's protobuf schema under
//! `{topic}-value` and capture the returned numeric ID. Every payload
//! published afterwards is framed with the standard wire convention:
//! one zero byte, the schema ID as big-endian u32, then the raw
//! protobuf bytes.

use crate::config::SchemaRegistryConfig;
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Serialize)]
struct RegisterRequest<'a> {
    #[serde(rename = "schemaType")]
    schema_type: &'a str,
    schema: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponse {
    id: u32,
}

pub struct SchemaRegistryClient {
    http: reqwest::Client,
    base_url: String,
    auth: Option<(String, String)>,
}

impl SchemaRegistryClient {
    pub fn new(config: &SchemaRegistryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            auth: config
                .auth
                .as_ref()
                .map(|a| (a.username.clone(), a.password.clone())),
        }
    }

    /// Registers (or re-uses, if identical) a protobuf schema for the
    /// topic's value subject and returns the registry-assigned ID.
    pub async fn register(&self, topic: &str, schema: &str) -> Result<u32> {
        let url = format!("{}/subjects/{}-value/versions", self.base_url, topic);
        let mut request = self.http.post(&url).json(&RegisterRequest {
            schema_type: "PROTOBUF",
            schema,
        });
        if let Some((user, pass)) = &self.auth {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SchemaRegistry(format!(
                "registration for '{}' failed with {}: {}",
                topic, status, body
            )));
        }

        let body: RegisterResponse = response
            .json()
            .await
            .map_err(|e| Error::SchemaRegistry(format!("invalid registry response: {}", e)))?;
        info!(topic, schema_id = body.id, "registered schema");
        Ok(body.id)
    }
}

/// Frames a payload with the 5-byte schema marker: format byte 0 plus
/// the big-endian schema ID.
pub fn frame(schema_id: u32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(5 + payload.len());
    buf.put_u8(0);
    buf.put_u32(schema_id);
    buf.put_slice(payload);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_prepends_marker_and_id() {
        let framed = frame(0x0102_0304, b"abc");
        assert_eq!(&framed[..], &[0, 1, 2, 3, 4, b'a', b'b', b'c']);
    }

    #[test]
    fn frame_zero_id() {
        let framed = frame(0, b"");
        assert_eq!(&framed[..], &[0, 0, 0, 0, 0]);
    }
}
