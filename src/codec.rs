use serde::{Deserialize, Serialize};

use crate::error::{TransportError, TransportResult};

/// Trait for encoding and decoding transport frames.
///
/// Payloads are untyped values, so every codec must be self-describing.
pub trait Codec: Send + Sync + std::fmt::Debug {
    /// Encode a serializable value into bytes
    fn encode<T: Serialize>(&self, data: &T) -> TransportResult<Vec<u8>>;

    /// Decode bytes into a deserializable value
    fn decode<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> TransportResult<T>;
}

/// JSON codec (default), matching the `{channel, payload}` wire contract
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, data: &T) -> TransportResult<Vec<u8>> {
        serde_json::to_vec(data).map_err(|e| TransportError::Protocol(e.to_string()))
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> TransportResult<T> {
        serde_json::from_slice(data).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// MessagePack codec - compact binary, cross-language compatible
#[cfg(feature = "codec-messagepack")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackCodec;

#[cfg(feature = "codec-messagepack")]
impl Codec for MessagePackCodec {
    fn encode<T: Serialize>(&self, data: &T) -> TransportResult<Vec<u8>> {
        rmp_serde::to_vec_named(data).map_err(|e| TransportError::Protocol(e.to_string()))
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> TransportResult<T> {
        rmp_serde::from_slice(data).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// CBOR codec - binary JSON (RFC 8949), self-describing
#[cfg(feature = "codec-cbor")]
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

#[cfg(feature = "codec-cbor")]
impl Codec for CborCodec {
    fn encode<T: Serialize>(&self, data: &T) -> TransportResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(data, &mut buf)
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        Ok(buf)
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> TransportResult<T> {
        ciborium::from_reader(data).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_json_codec_is_plain_json() {
        let value = json!({"channel": "x", "payload": 42});
        let bytes = JsonCodec.encode(&value).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"{"channel":"x","payload":42}"#);
    }

    #[test]
    fn test_json_decode_failure_is_not_fatal() {
        let err = JsonCodec.decode::<Value>(b"{not json").unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
        assert!(!err.is_fatal());
    }

    #[cfg(feature = "codec-messagepack")]
    #[test]
    fn test_messagepack_untyped_value() {
        let value = json!({"channel": "x", "payload": [1, "two", null]});
        let bytes = MessagePackCodec.encode(&value).unwrap();
        let decoded: Value = MessagePackCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[cfg(feature = "codec-cbor")]
    #[test]
    fn test_cbor_untyped_value() {
        let value = json!({"channel": "x", "payload": {"nested": true}});
        let bytes = CborCodec.encode(&value).unwrap();
        let decoded: Value = CborCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }
}
