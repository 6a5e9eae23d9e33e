/// Outbound half of the socket, as the session sees it.
///
/// Connecting and reconnecting are the implementation's business. Inbound
/// frames are parsed by the implementation and handed to
/// [`Session::on_message`](crate::Session::on_message), usually through
/// [`Session::pump`](crate::Session::pump).
pub trait Transport: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Queues one UTF-8 JSON frame.
    fn send(&self, frame: String) -> Result<(), TransportError>;

    fn close(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    Unavailable,
    #[error("transport closed")]
    Closed,
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },
}
