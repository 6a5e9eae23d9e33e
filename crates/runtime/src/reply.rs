use foundation::RequestId;
use serde_json::Value;

/// An inbound reply as seen by the correlator.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub id: RequestId,
    pub payload: Value,
    /// Diagnostic text from the remote side. Never a failure signal on its own.
    pub error: Option<String>,
}

impl Reply {
    pub fn new(id: impl Into<RequestId>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Whether this reply satisfies `expected`.
    ///
    /// Query replies wrap their results in a sequence, so a single-element
    /// sequence matches its element as well as itself.
    pub fn matches(&self, expected: &Value) -> bool {
        if &self.payload == expected {
            return true;
        }
        matches!(&self.payload, Value::Array(items) if items.len() == 1 && &items[0] == expected)
    }

    /// The payload with a single-element sequence unwrapped.
    pub fn value(&self) -> Value {
        match &self.payload {
            Value::Array(items) if items.len() == 1 => items[0].clone(),
            other => other.clone(),
        }
    }

    /// First element of a sequence payload; `Null` for an empty sequence.
    /// Non-sequence payloads are returned as-is.
    pub fn first(&self) -> Value {
        match &self.payload {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        }
    }

    /// The payload as a sequence. `Null` becomes empty and a scalar becomes a
    /// one-element sequence.
    pub fn into_values(self) -> Vec<Value> {
        match self.payload {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }
}
