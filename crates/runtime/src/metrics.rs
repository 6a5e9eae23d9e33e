/// Counters kept by the correlator.
///
/// Snapshots are sorted by name so they can be diffed across log lines.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    /// Waiters completed with a matching reply.
    pub resolved: u64,
    /// One-shot waiters failed by a mismatching reply.
    pub rejected: u64,
    /// Mismatching replies skipped by repeating waiters.
    pub ignored: u64,
    /// Replies that arrived with nobody waiting.
    pub dropped: u64,
    /// Replies carrying a remote error field.
    pub remote_errors: u64,
    /// Waiters displaced by a newer registration for the same id.
    pub superseded: u64,
    /// Waiters currently registered.
    pub pending: u64,
}

impl Metrics {
    /// Returns a stable, sorted snapshot suitable for logs.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("replies.dropped", self.dropped),
            ("replies.ignored", self.ignored),
            ("replies.rejected", self.rejected),
            ("replies.remote_error", self.remote_errors),
            ("replies.resolved", self.resolved),
            ("waiters.pending", self.pending),
            ("waiters.superseded", self.superseded),
        ]
    }
}
