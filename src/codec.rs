//! Byte encoding of stored records.
//!
//! The store persists a value together with its ETag and TTL through a
//! [`Codec`]. [`JsonCodec`] is the bundled default and writes
//!
//! ```json
//! {"etag": "…", "ttl": {"secs": 60, "nanos": 0}, "value": …}
//! ```
//!
//! with `ttl` omitted for records that never expire. The TTL keeps serde's
//! `Duration` layout so it round-trips at nanosecond precision.

use crate::record::{ETag, Record};
use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::time::Duration;

/// Converts records to and from the bytes a medium stores.
pub trait Codec<V>: Send + Sync + 'static {
    /// Encodes a value with the ETag and TTL it is persisted under.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    fn encode(&self, value: &V, etag: &ETag, ttl: Option<Duration>) -> Result<Vec<u8>>;

    /// Decodes stored bytes. The returned record always carries an ETag.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed or carry no ETag.
    fn decode(&self, bytes: &[u8]) -> Result<Record<V>>;
}

#[derive(Serialize)]
struct EnvelopeRef<'a, V> {
    etag: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<Duration>,
    value: &'a V,
}

#[derive(Deserialize)]
struct Envelope<V> {
    etag: String,
    #[serde(default)]
    ttl: Option<Duration>,
    value: V,
}

/// JSON envelope codec backed by `serde_json`.
pub struct JsonCodec<V> {
    _value: PhantomData<fn() -> V>,
}

impl<V> JsonCodec<V> {
    pub fn new() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<V> Default for JsonCodec<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Codec<V> for JsonCodec<V>
where
    V: Serialize + DeserializeOwned + 'static,
{
    fn encode(&self, value: &V, etag: &ETag, ttl: Option<Duration>) -> Result<Vec<u8>> {
        let envelope = EnvelopeRef {
            etag: etag.as_str(),
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
            value,
        };
        serde_json::to_vec(&envelope).context("Failed to serialize record to JSON")
    }

    fn decode(&self, bytes: &[u8]) -> Result<Record<V>> {
        let envelope: Envelope<V> =
            serde_json::from_slice(bytes).context("Failed to deserialize record from JSON")?;

        if envelope.etag.is_empty() {
            bail!("Stored record has an empty etag");
        }

        Ok(Record {
            value: envelope.value,
            etag: Some(ETag::new(envelope.etag)),
            ttl: envelope.ttl.filter(|ttl| !ttl.is_zero()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Session {
        user: String,
        hits: u32,
    }

    #[test]
    fn test_encode_layout() {
        let codec = JsonCodec::<u32>::new();
        let bytes = codec
            .encode(&7, &ETag::from("e1"), Some(Duration::from_secs(60)))
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"etag": "e1", "ttl": {"secs": 60, "nanos": 0}, "value": 7})
        );
    }

    #[test]
    fn test_no_ttl_is_omitted() {
        let codec = JsonCodec::<u32>::new();
        let bytes = codec.encode(&7, &ETag::from("e1"), None).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json.get("ttl").is_none());
    }

    #[test]
    fn test_sub_millisecond_ttl_round_trips() {
        let codec = JsonCodec::<u32>::new();
        for ttl in [
            Duration::from_nanos(1),
            Duration::from_micros(500),
            Duration::from_micros(1_900),
            Duration::new(3, 999_999_999),
        ] {
            let bytes = codec.encode(&7, &ETag::from("e1"), Some(ttl)).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap().ttl, Some(ttl));
        }
    }

    #[test]
    fn test_zero_ttl_is_omitted() {
        let codec = JsonCodec::<u32>::new();
        let bytes = codec
            .encode(&7, &ETag::from("e1"), Some(Duration::ZERO))
            .unwrap();
        assert_eq!(codec.decode(&bytes).unwrap().ttl, None);
    }

    #[test]
    fn test_decode_struct_value() {
        let codec = JsonCodec::<Session>::new();
        let session = Session {
            user: "alice".into(),
            hits: 3,
        };
        let bytes = codec
            .encode(&session, &ETag::from("e9"), Some(Duration::from_millis(250)))
            .unwrap();

        let record = codec.decode(&bytes).unwrap();
        assert_eq!(record.value, session);
        assert_eq!(record.etag, Some(ETag::from("e9")));
        assert_eq!(record.ttl, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_decode_rejects_empty_etag() {
        let codec = JsonCodec::<u32>::new();
        let err = codec.decode(br#"{"etag":"","value":1}"#).unwrap_err();
        assert!(err.to_string().contains("empty etag"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = JsonCodec::<u32>::new();
        assert!(codec.decode(b"not json").is_err());
        assert!(codec.decode(br#"{"value":1}"#).is_err());
    }
}
