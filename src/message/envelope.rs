use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::ResponseId;
use crate::error::Result;

/// The `{channel, payload}` wrapper carried as the data of a message event.
///
/// `response_id`, `reply` and `error` only appear on request/response traffic
/// and are omitted from the wire form when unset. `reply` marks an answer to
/// an earlier request so it is never mistaken for a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    pub channel: String,
    pub payload: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub reply: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl<T> Envelope<T> {
    pub fn new(channel: impl Into<String>, payload: T) -> Self {
        Self {
            channel: channel.into(),
            payload,
            response_id: None,
            reply: false,
            error: None,
        }
    }

    /// Envelope for an `invoke` request awaiting a reply under `id`.
    pub fn request(channel: impl Into<String>, payload: T, id: &ResponseId) -> Self {
        Self {
            response_id: Some(id.as_str().to_string()),
            ..Self::new(channel, payload)
        }
    }

    pub fn response_id(&self) -> Option<ResponseId> {
        self.response_id.as_deref().map(ResponseId::from_raw)
    }
}

impl<T: Serialize> Envelope<T> {
    /// Convert into the untyped wire form.
    pub fn into_value(self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Envelope<Value> {
    /// Successful reply to the request identified by `id`.
    pub fn reply(channel: impl Into<String>, payload: Value, id: &ResponseId) -> Self {
        Self {
            reply: true,
            ..Self::request(channel, payload, id)
        }
    }

    /// Failed reply to the request identified by `id`.
    pub fn failure(channel: impl Into<String>, id: &ResponseId, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::reply(channel, Value::Null, id)
        }
    }

    /// Read an envelope out of raw event data.
    ///
    /// Returns `None` unless `data` is an object holding a non-empty string
    /// `channel` and a `payload` key. An explicit `null` payload is present.
    /// Non-string `response_id`/`error` fields and a non-boolean `reply` are
    /// ignored.
    pub fn parse(data: &Value) -> Option<Self> {
        let object = data.as_object()?;
        let channel = object.get("channel")?.as_str()?;
        if channel.is_empty() {
            return None;
        }
        let payload = object.get("payload")?.clone();

        let text_field = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

        Some(Self {
            channel: channel.to_string(),
            payload,
            response_id: text_field("response_id"),
            reply: object.get("reply").and_then(Value::as_bool).unwrap_or(false),
            error: text_field("error"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_envelope_wire_shape() {
        let value = Envelope::new("x", 42).into_value().unwrap();
        assert_eq!(value, json!({"channel": "x", "payload": 42}));
    }

    #[test]
    fn test_parse_requires_channel_and_payload() {
        assert!(Envelope::parse(&json!({"channel": "x"})).is_none());
        assert!(Envelope::parse(&json!({"payload": 1})).is_none());
        assert!(Envelope::parse(&json!({"channel": "", "payload": 1})).is_none());
        assert!(Envelope::parse(&json!({"channel": 7, "payload": 1})).is_none());
        assert!(Envelope::parse(&json!("channel")).is_none());
        assert!(Envelope::parse(&Value::Null).is_none());
    }

    #[test]
    fn test_parse_null_payload_is_present() {
        let envelope = Envelope::parse(&json!({"channel": "x", "payload": null})).unwrap();
        assert_eq!(envelope.channel, "x");
        assert_eq!(envelope.payload, Value::Null);
        assert!(envelope.response_id.is_none());
    }

    #[test]
    fn test_failure_reply_carries_error() {
        let id = ResponseId::from_raw("abc");
        let value = Envelope::failure("sum", &id, "boom").into_value().unwrap();
        assert_eq!(
            value,
            json!({
                "channel": "sum",
                "payload": null,
                "response_id": "abc",
                "reply": true,
                "error": "boom"
            })
        );

        let parsed = Envelope::parse(&value).unwrap();
        assert_eq!(parsed.response_id(), Some(id));
        assert!(parsed.reply);
        assert_eq!(parsed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_request_and_reply_are_distinguished() {
        let id = ResponseId::from_raw("abc");

        let request = Envelope::request("sum", json!([1, 2]), &id).into_value().unwrap();
        assert_eq!(
            request,
            json!({"channel": "sum", "payload": [1, 2], "response_id": "abc"})
        );
        assert!(!Envelope::parse(&request).unwrap().reply);

        let reply = Envelope::reply("sum", json!(3), &id).into_value().unwrap();
        assert_eq!(reply["reply"], json!(true));
        assert!(Envelope::parse(&reply).unwrap().reply);
    }
}
