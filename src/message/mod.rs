pub mod envelope;
pub mod types;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use self::envelope::Envelope;
use self::types::{CONNECT_EVENT, DISCONNECT_EVENT};
use crate::error::Result;

/// A named event as carried by an [`EventTransport`](crate::EventTransport).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "event")]
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl Event {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Wrap an envelope under the given message event name.
    pub fn envelope<T: Serialize>(event_name: &str, envelope: Envelope<T>) -> Result<Self> {
        Ok(Self::new(event_name, envelope.into_value()?))
    }

    pub fn connect() -> Self {
        Self::new(CONNECT_EVENT, Value::Null)
    }

    pub fn disconnect(reason: impl Into<String>) -> Self {
        Self::new(DISCONNECT_EVENT, Value::String(reason.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, JsonCodec};
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let event = Event::envelope("message", Envelope::new("x", "hi")).unwrap();
        let bytes = JsonCodec.encode(&event).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!({"event": "message", "data": {"channel": "x", "payload": "hi"}})
        );
    }

    #[test]
    fn test_event_without_data_decodes_as_null() {
        let event: Event = JsonCodec.decode(br#"{"event":"connect"}"#).unwrap();
        assert_eq!(event, Event::connect());
    }
}
