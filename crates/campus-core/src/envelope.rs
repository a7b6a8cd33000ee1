//! Wire payload delivered to clients: `{ "event": <tag>, "data": <json> }`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single event as seen by the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event-type tag (see [`crate::events`]).
    pub event: String,
    /// Arbitrary structured body.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an envelope from a tag and body.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serialize once for fan-out; every recipient shares the same buffer.
    pub fn to_frame(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_shape() {
        let env = Envelope::new("fee:paid", json!({"amount": 1200, "studentId": "s-1"}));
        let frame = env.to_frame().unwrap();
        let parsed: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["event"], "fee:paid");
        assert_eq!(parsed["data"]["amount"], 1200);
        assert_eq!(parsed.as_object().unwrap().len(), 2);
    }

    #[test]
    fn missing_data_defaults_to_null() {
        let env: Envelope = serde_json::from_str(r#"{"event":"pong"}"#).unwrap();
        assert_eq!(env.event, "pong");
        assert!(env.data.is_null());
    }
}
