//! Routes inbound replies to the caller awaiting them.
//!
//! Every registration is keyed by a [`RequestId`]. A reply for an id with no
//! registered waiter is dropped; nothing is queued for later claimants.
//!
//! One-shot waiters complete on the first reply: resolved if it matches the
//! expected value (or no value was expected), rejected otherwise. Repeating
//! waiters skip mismatching replies and stay registered until a match arrives.
//! Either way the waiter leaves the table in the same critical section that
//! completes it, so the id can be reused immediately.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use foundation::RequestId;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::metrics::Metrics;
use crate::reply::Reply;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CorrelationError {
    #[error("unexpected reply for {id}: expected {expected}, got {actual}")]
    UnexpectedReply {
        id: RequestId,
        expected: Value,
        actual: Value,
    },
    #[error("waiter for {id} was superseded by a newer registration")]
    Superseded { id: RequestId },
    #[error("a waiter for {id} is already registered")]
    DuplicateWaiter { id: RequestId },
    #[error("correlator closed while waiting for {id}")]
    Closed { id: RequestId },
}

/// What happens when an id that already has a live waiter is registered again.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// The newest registration wins; the older waiter fails with
    /// [`CorrelationError::Superseded`].
    #[default]
    Supersede,
    /// The new registration fails with [`CorrelationError::DuplicateWaiter`]
    /// and the live waiter is left alone.
    Reject,
}

/// Result of handing one reply to the correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Resolved,
    Rejected,
    /// A repeating waiter saw a non-matching value and is still registered.
    Ignored,
    /// Nobody was waiting on the id.
    Dropped,
}

type Outcome = Result<Reply, CorrelationError>;

#[derive(Debug)]
struct Waiter {
    ticket: u64,
    expected: Option<Value>,
    repeating: bool,
    tx: oneshot::Sender<Outcome>,
}

impl Waiter {
    fn accepts(&self, reply: &Reply) -> bool {
        self.expected
            .as_ref()
            .map_or(true, |expected| reply.matches(expected))
    }

    /// The caller dropped its `PendingReply`.
    fn abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug, Default)]
struct Table {
    waiters: HashMap<RequestId, Waiter>,
    next_ticket: u64,
    metrics: Metrics,
}

/// Per-session id → waiter routing table.
#[derive(Debug, Default)]
pub struct Correlator {
    policy: DuplicatePolicy,
    table: Mutex<Table>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            table: Mutex::new(Table::default()),
        }
    }

    /// Registers interest in the next reply for `id`.
    ///
    /// Registration happens before this returns, so a message may be sent
    /// right after without racing its reply. The returned future never times
    /// out.
    pub fn await_reply(
        &self,
        id: impl Into<RequestId>,
        expected: Option<Value>,
        repeating: bool,
    ) -> Result<PendingReply, CorrelationError> {
        let id = id.into();
        let mut guard = self.table.lock();
        let table = &mut *guard;

        let live = table.waiters.get(&id).is_some_and(|w| !w.abandoned());
        if live && self.policy == DuplicatePolicy::Reject {
            return Err(CorrelationError::DuplicateWaiter { id });
        }

        let ticket = table.next_ticket;
        table.next_ticket += 1;
        let (tx, rx) = oneshot::channel();
        let waiter = Waiter {
            ticket,
            expected,
            repeating,
            tx,
        };

        if let Some(previous) = table.waiters.insert(id.clone(), waiter) {
            if !previous.abandoned() {
                debug!(%id, "superseding pending waiter");
                table.metrics.superseded += 1;
                let _ = previous
                    .tx
                    .send(Err(CorrelationError::Superseded { id: id.clone() }));
            }
        }

        trace!(%id, repeating, "waiter registered");
        Ok(PendingReply { id, ticket, rx })
    }

    /// Delivers `reply` to the waiter registered under its id, if any.
    pub fn dispatch_reply(&self, reply: Reply) -> Dispatch {
        let mut guard = self.table.lock();
        let table = &mut *guard;

        if let Some(err) = &reply.error {
            table.metrics.remote_errors += 1;
            warn!(id = %reply.id, "remote error: {err}");
        }

        let waiter = match table.waiters.remove(&reply.id) {
            Some(waiter) if !waiter.abandoned() => waiter,
            _ => {
                table.metrics.dropped += 1;
                debug!(id = %reply.id, "no waiter, dropping reply");
                return Dispatch::Dropped;
            }
        };

        if waiter.accepts(&reply) {
            table.metrics.resolved += 1;
            trace!(id = %reply.id, "reply resolved waiter");
            let _ = waiter.tx.send(Ok(reply));
            Dispatch::Resolved
        } else if waiter.repeating {
            table.metrics.ignored += 1;
            trace!(id = %reply.id, payload = %reply.payload, "still waiting");
            table.waiters.insert(reply.id.clone(), waiter);
            Dispatch::Ignored
        } else {
            table.metrics.rejected += 1;
            let err = CorrelationError::UnexpectedReply {
                id: reply.id,
                expected: waiter.expected.unwrap_or_default(),
                actual: reply.payload,
            };
            debug!("{err}");
            let _ = waiter.tx.send(Err(err));
            Dispatch::Rejected
        }
    }

    /// Removes the waiter behind `pending` unless a newer registration has
    /// already replaced it.
    pub fn withdraw(&self, pending: &PendingReply) -> bool {
        let mut table = self.table.lock();
        let current = table
            .waiters
            .get(&pending.id)
            .is_some_and(|w| w.ticket == pending.ticket);
        if current {
            table.waiters.remove(&pending.id);
        }
        current
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.table
            .lock()
            .waiters
            .get(id)
            .is_some_and(|w| !w.abandoned())
    }

    /// Ids with a live waiter, sorted.
    pub fn pending_ids(&self) -> Vec<RequestId> {
        let table = self.table.lock();
        let mut ids: Vec<_> = table
            .waiters
            .iter()
            .filter(|(_, w)| !w.abandoned())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.table
            .lock()
            .waiters
            .values()
            .filter(|w| !w.abandoned())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fails every registered waiter with [`CorrelationError::Closed`].
    ///
    /// Returns the number of live waiters that were failed.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.table.lock().waiters.drain().collect();
        let mut failed = 0;
        for (id, waiter) in drained {
            if waiter.tx.send(Err(CorrelationError::Closed { id })).is_ok() {
                failed += 1;
            }
        }
        if failed > 0 {
            debug!(failed, "cleared pending waiters");
        }
        failed
    }

    pub fn metrics(&self) -> Metrics {
        let table = self.table.lock();
        Metrics {
            pending: table.waiters.values().filter(|w| !w.abandoned()).count() as u64,
            ..table.metrics
        }
    }
}

/// Future side of a registration made with [`Correlator::await_reply`].
#[derive(Debug)]
#[must_use = "a pending reply does nothing unless awaited"]
pub struct PendingReply {
    id: RequestId,
    ticket: u64,
    rx: oneshot::Receiver<Outcome>,
}

impl Future for PendingReply {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Sender gone without an outcome: the correlator itself was dropped.
            Poll::Ready(Err(_)) => Poll::Ready(Err(CorrelationError::Closed {
                id: self.id.clone(),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CorrelationError, Correlator, Dispatch, DuplicatePolicy};
    use crate::reply::Reply;
    use foundation::RequestId;
    use futures_util::FutureExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn resolves_first_reply_without_expected_value() {
        let c = Correlator::new();
        let pending = c.await_reply("q1", None, false).unwrap();

        assert_eq!(
            c.dispatch_reply(Reply::new("q1", json!(["ALIVE"]))),
            Dispatch::Resolved
        );
        let reply = pending.await.unwrap();
        assert_eq!(reply.payload, json!(["ALIVE"]));

        // Deregistered with the resolution; a second reply has nowhere to go.
        assert_eq!(
            c.dispatch_reply(Reply::new("q1", json!(["AGAIN"]))),
            Dispatch::Dropped
        );
        assert!(c.is_empty());
    }

    #[tokio::test]
    async fn one_shot_mismatch_rejects_and_deregisters() {
        let c = Correlator::new();
        let pending = c.await_reply("p1", Some(json!("repeating")), false).unwrap();

        assert_eq!(
            c.dispatch_reply(Reply::new("p1", json!(["nope"]))),
            Dispatch::Rejected
        );
        assert_eq!(
            pending.await,
            Err(CorrelationError::UnexpectedReply {
                id: "p1".into(),
                expected: json!("repeating"),
                actual: json!(["nope"]),
            })
        );
        assert_eq!(
            c.dispatch_reply(Reply::new("p1", json!(["repeating"]))),
            Dispatch::Dropped
        );
    }

    #[tokio::test]
    async fn repeating_waiter_skips_until_match() {
        let c = Correlator::new();
        let mut pending = c.await_reply("p1", Some(json!("e")), true).unwrap();

        for value in ["r1", "r2", "r3"] {
            assert_eq!(
                c.dispatch_reply(Reply::new("p1", json!([value]))),
                Dispatch::Ignored
            );
            assert!((&mut pending).now_or_never().is_none());
            assert!(c.is_pending("p1"));
        }

        assert_eq!(
            c.dispatch_reply(Reply::new("p1", json!(["e"]))),
            Dispatch::Resolved
        );
        assert_eq!(pending.await.unwrap().value(), json!("e"));
        assert!(!c.is_pending("p1"));

        let m = c.metrics();
        assert_eq!(m.ignored, 3);
        assert_eq!(m.resolved, 1);
        assert_eq!(m.pending, 0);
    }

    #[tokio::test]
    async fn reply_without_waiter_is_dropped() {
        let c = Correlator::new();
        assert_eq!(
            c.dispatch_reply(Reply::new("ghost", json!(1))),
            Dispatch::Dropped
        );
        assert_eq!(c.metrics().dropped, 1);
    }

    #[tokio::test]
    async fn newest_registration_supersedes_by_default() {
        let c = Correlator::new();
        assert_eq!(DuplicatePolicy::default(), DuplicatePolicy::Supersede);

        let first = c.await_reply("q", None, false).unwrap();
        let second = c.await_reply("q", None, false).unwrap();

        assert_eq!(
            first.await,
            Err(CorrelationError::Superseded { id: "q".into() })
        );
        c.dispatch_reply(Reply::new("q", json!(["ok"])));
        assert_eq!(second.await.unwrap().first(), json!("ok"));
        assert_eq!(c.metrics().superseded, 1);
    }

    #[tokio::test]
    async fn reject_policy_keeps_the_live_waiter() {
        let c = Correlator::with_policy(DuplicatePolicy::Reject);
        let first = c.await_reply("q", None, false).unwrap();

        assert_eq!(
            c.await_reply("q", None, false).unwrap_err(),
            CorrelationError::DuplicateWaiter { id: "q".into() }
        );

        c.dispatch_reply(Reply::new("q", json!(["ok"])));
        assert_eq!(first.await.unwrap().first(), json!("ok"));
    }

    #[tokio::test]
    async fn abandoned_waiter_does_not_block_reregistration() {
        let c = Correlator::with_policy(DuplicatePolicy::Reject);
        drop(c.await_reply("q", None, false).unwrap());
        assert!(!c.is_pending("q"));

        let again = c.await_reply("q", None, false).unwrap();
        c.dispatch_reply(Reply::new("q", json!(["ok"])));
        assert!(again.await.is_ok());
        assert_eq!(c.metrics().superseded, 0);
    }

    #[tokio::test]
    async fn remote_error_is_carried_not_rejected() {
        let c = Correlator::new();
        let pending = c.await_reply("q", None, false).unwrap();

        c.dispatch_reply(Reply::new("q", json!([null])).with_error("no such node"));
        let reply = pending.await.unwrap();
        assert!(reply.is_error());
        assert_eq!(reply.error.as_deref(), Some("no such node"));
        assert_eq!(c.metrics().remote_errors, 1);
    }

    #[tokio::test]
    async fn clear_fails_everything_pending() {
        let c = Correlator::new();
        let a = c.await_reply("a", None, false).unwrap();
        let b = c.await_reply("b", Some(json!("x")), true).unwrap();
        assert_eq!(
            c.pending_ids(),
            vec![RequestId::from("a"), RequestId::from("b")]
        );

        assert_eq!(c.clear(), 2);
        assert_eq!(a.await, Err(CorrelationError::Closed { id: "a".into() }));
        assert_eq!(b.await, Err(CorrelationError::Closed { id: "b".into() }));
        assert!(c.is_empty());
    }

    #[tokio::test]
    async fn withdraw_only_removes_own_registration() {
        let c = Correlator::new();
        let stale = c.await_reply("q", None, false).unwrap();
        let fresh = c.await_reply("q", None, false).unwrap();

        assert!(!c.withdraw(&stale));
        assert!(c.is_pending("q"));
        assert!(c.withdraw(&fresh));
        assert!(!c.is_pending("q"));
    }

    #[tokio::test]
    async fn id_is_reusable_after_resolution() {
        let c = Correlator::new();
        for round in 0..3 {
            let pending = c.await_reply("q", None, false).unwrap();
            c.dispatch_reply(Reply::new("q", json!([round])));
            assert_eq!(pending.await.unwrap().first(), json!(round));
        }
        assert_eq!(c.metrics().superseded, 0);
    }
}
