use std::fmt;

use foundation::RequestId;

const LOOKUP_PREFIX: &str = "/q/";
const BIND_PREFIX: &str = "/bind/";
const STOP_PREFIX: &str = "/socket.stop(";

/// The `q` field of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// `/q/<path>`: one-shot or repeating scene-graph lookup.
    Lookup(String),
    /// `/bind/<path>`: event subscription.
    Bind(String),
    /// `/socket.stop(<id>)`: stop a repeating query or subscription.
    Stop(RequestId),
}

impl Query {
    pub fn lookup(path: &str) -> Self {
        Self::Lookup(normalize(path))
    }

    pub fn bind(path: &str) -> Self {
        Self::Bind(normalize(path))
    }

    pub fn stop(id: impl Into<RequestId>) -> Self {
        Self::Stop(id.into())
    }

    /// Parses a `q` string back into a query. Used by peers and test doubles.
    pub fn parse(q: &str) -> Option<Self> {
        if let Some(path) = q.strip_prefix(LOOKUP_PREFIX) {
            return Some(Self::Lookup(path.to_string()));
        }
        if let Some(path) = q.strip_prefix(BIND_PREFIX) {
            return Some(Self::Bind(path.to_string()));
        }
        q.strip_prefix(STOP_PREFIX)
            .and_then(|rest| rest.strip_suffix(')'))
            .map(|id| Self::Stop(RequestId::new(id)))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup(path) => write!(f, "{LOOKUP_PREFIX}{path}"),
            Self::Bind(path) => write!(f, "{BIND_PREFIX}{path}"),
            Self::Stop(id) => write!(f, "{STOP_PREFIX}{id})"),
        }
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}
