//! Wire format for the scene-graph socket.
//!
//! Outbound: `{ "id": string, "q": string, "repeat"?: { "freq": number } }`
//!
//! Inbound: `{ "id": string, "data"?: [value], "info"?: value, "error"?: string }`
//!
//! Query replies carry their results in `data`; event and acknowledgment
//! replies may use `info` instead. Both are "the payload" to the correlator.

use foundation::RequestId;
use runtime::Reply;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::Query;

/// Acknowledges that a repeating query started.
pub const REPEATING: &str = "repeating";
/// Acknowledges a stop.
pub const STOPPED: &str = "stopped";
/// Acknowledges an event binding.
pub const BOUND: &str = "bound";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repeat {
    /// Sampling frequency in Hz. `0` re-emits on every update tick.
    pub freq: u32,
}

/// Message from client to the remote scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: RequestId,
    pub q: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<Repeat>,
}

impl OutboundMessage {
    pub fn new(id: impl Into<RequestId>, query: Query) -> Self {
        Self {
            id: id.into(),
            q: query.to_string(),
            repeat: None,
        }
    }

    pub fn lookup(id: impl Into<RequestId>, path: &str) -> Self {
        Self::new(id, Query::lookup(path))
    }

    pub fn repeating(id: impl Into<RequestId>, path: &str, freq: u32) -> Self {
        Self {
            repeat: Some(Repeat { freq }),
            ..Self::lookup(id, path)
        }
    }

    /// `id` should already be event-namespaced.
    pub fn bind(id: impl Into<RequestId>, path: &str) -> Self {
        Self::new(id, Query::bind(path))
    }

    /// Stop message for `id`, sent under the same id.
    pub fn stop(id: impl Into<RequestId>) -> Self {
        let id = id.into();
        Self::new(id.clone(), Query::stop(id))
    }

    pub fn query(&self) -> Option<Query> {
        Query::parse(&self.q)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Message from the remote scene to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InboundMessage {
    pub fn data(id: impl Into<RequestId>, values: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            data: Some(values),
            info: None,
            error: None,
        }
    }

    pub fn info(id: impl Into<RequestId>, value: Value) -> Self {
        Self {
            id: id.into(),
            data: None,
            info: Some(value),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// The payload is `info` when present, else `data` as a sequence, else
    /// `null`.
    pub fn into_reply(self) -> Reply {
        let payload = match (self.info, self.data) {
            (Some(info), _) => info,
            (None, Some(data)) => Value::Array(data),
            (None, None) => Value::Null,
        };
        Reply {
            id: self.id,
            payload,
            error: self.error,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl From<InboundMessage> for Reply {
    fn from(msg: InboundMessage) -> Self {
        msg.into_reply()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn outbound_shapes() {
        let lookup = OutboundMessage::lookup("q1", "scene/Player");
        assert_eq!(
            serde_json::to_value(&lookup).unwrap(),
            json!({"id": "q1", "q": "/q/scene/Player"})
        );

        let repeat = OutboundMessage::repeating("p1", "scene/Player/hp", 0);
        assert_eq!(
            serde_json::to_value(&repeat).unwrap(),
            json!({"id": "p1", "q": "/q/scene/Player/hp", "repeat": {"freq": 0}})
        );

        let bind = OutboundMessage::bind(RequestId::event("ready"), "scene/Door");
        assert_eq!(
            serde_json::to_value(&bind).unwrap(),
            json!({"id": "event:ready", "q": "/bind/scene/Door"})
        );

        let stop = OutboundMessage::stop("p1");
        assert_eq!(
            serde_json::to_value(&stop).unwrap(),
            json!({"id": "p1", "q": "/socket.stop(p1)"})
        );
        assert_eq!(stop.query(), Some(Query::stop("p1")));
    }

    #[test]
    fn inbound_payload_prefers_info() {
        let msg = InboundMessage::from_json(r#"{"id":"e","info":"bound","data":["x"]}"#).unwrap();
        assert_eq!(msg.into_reply().payload, json!("bound"));

        let msg = InboundMessage::from_json(r#"{"id":"q2","data":["E1","E2"]}"#).unwrap();
        assert_eq!(msg.into_reply().payload, json!(["E1", "E2"]));

        let msg = InboundMessage::from_json(r#"{"id":"q3"}"#).unwrap();
        assert_eq!(msg.into_reply().payload, json!(null));
    }

    #[test]
    fn into_reply_keeps_error_text() {
        let reply = InboundMessage::from_json(r#"{"id":"q","data":[null],"error":"missing node"}"#)
            .unwrap()
            .into_reply();
        assert_eq!(reply.id, RequestId::new("q"));
        assert_eq!(reply.payload, json!([null]));
        assert_eq!(reply.error.as_deref(), Some("missing node"));
    }

    #[test]
    fn inbound_rejects_missing_id() {
        assert!(InboundMessage::from_json(r#"{"data":[1]}"#).is_err());
    }
}
