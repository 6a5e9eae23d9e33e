use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix that keeps event subscriptions apart from query ids.
pub const EVENT_NAMESPACE: &str = "event:";

/// Correlation token tying an outbound message to the replies it produces.
///
/// Ids are opaque to the correlation layer. The only structure imposed is the
/// event namespace, so `RequestId::new("ready")` and `RequestId::event("ready")`
/// never collide.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Namespaced id for an event binding called `name`.
    pub fn event(name: &str) -> Self {
        Self(format!("{EVENT_NAMESPACE}{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&RequestId> for RequestId {
    fn from(id: &RequestId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for RequestId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
