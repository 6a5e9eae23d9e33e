//! Public query API over one socket.
//!
//! A `Session` owns its [`Correlator`] and the registry of running repeating
//! queries. Every operation registers a waiter before its message goes out,
//! so a fast reply can never beat the registration.

use std::sync::Arc;
use std::time::Duration;

use foundation::{Delay, RequestId, RetryPolicy, TokioDelay, retry};
use protocol::{BOUND, InboundMessage, OutboundMessage, REPEATING, STOPPED};
use runtime::{Correlator, Dispatch, DuplicatePolicy, Metrics, Reply};
use serde_json::Value;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::error::SessionError;
use crate::registry::RepeatingRegistry;
use crate::transport::{Transport, TransportError};

pub const DEFAULT_BIND_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// What the correlator does when an id is registered twice.
    pub duplicate_policy: DuplicatePolicy,
    /// Pause between bind attempts when polling for an event source.
    pub bind_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::default(),
            bind_interval: DEFAULT_BIND_INTERVAL,
        }
    }
}

pub struct Session {
    transport: Arc<dyn Transport>,
    correlator: Correlator,
    // Never held across an await.
    repeating: Mutex<RepeatingRegistry>,
    delay: Arc<dyn Delay>,
    config: SessionConfig,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        Self {
            transport,
            correlator: Correlator::with_policy(config.duplicate_policy),
            repeating: Mutex::new(RepeatingRegistry::new()),
            delay: Arc::new(TokioDelay),
            config,
        }
    }

    /// Replaces the clock used by polling loops.
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn metrics(&self) -> Metrics {
        self.correlator.metrics()
    }

    pub fn is_ready(&self) -> bool {
        self.transport.is_ready()
    }

    /// Ids of repeating queries that have not been stopped.
    pub fn repeating_ids(&self) -> Vec<RequestId> {
        self.repeating.lock().ids()
    }

    /// Routes one inbound message to whoever is waiting on its id.
    pub fn on_message(&self, msg: InboundMessage) -> Dispatch {
        self.correlator.dispatch_reply(msg.into_reply())
    }

    /// Feeds every message from `inbound` into [`Session::on_message`] until
    /// the sender side closes.
    pub async fn pump(&self, mut inbound: mpsc::Receiver<InboundMessage>) {
        while let Some(msg) = inbound.recv().await {
            self.on_message(msg);
        }
        debug!("inbound stream ended");
    }

    /// One-shot lookup returning the whole reply, including any remote error.
    pub async fn request(
        &self,
        id: impl Into<RequestId>,
        path: &str,
    ) -> Result<Reply, SessionError> {
        let message = OutboundMessage::lookup(id, path);
        self.exchange(&message, None, false).await
    }

    /// One-shot lookup returning the first result value.
    pub async fn query(&self, id: impl Into<RequestId>, path: &str) -> Result<Value, SessionError> {
        Ok(self.request(id, path).await?.first())
    }

    /// One-shot lookup returning every result value.
    pub async fn query_all(
        &self,
        id: impl Into<RequestId>,
        path: &str,
    ) -> Result<Vec<Value>, SessionError> {
        Ok(self.request(id, path).await?.into_values())
    }

    /// Starts a server-side repeating query sampled at `frequency_hz`
    /// (`0` for every update tick) and waits for the peer to acknowledge it.
    ///
    /// Later replies for `id` are consumed with
    /// [`Session::wait_for_repeat_response`]. Replies nobody waits for are
    /// dropped.
    pub async fn repeat_query(
        &self,
        id: impl Into<RequestId>,
        path: &str,
        frequency_hz: u32,
    ) -> Result<(), SessionError> {
        let id = id.into();
        if !self.repeating.lock().reserve(id.clone()) {
            return Err(SessionError::DuplicateSubscription { id });
        }

        let message = OutboundMessage::repeating(id.clone(), path, frequency_hz);
        if let Err(err) = self
            .exchange(&message, Some(Value::from(REPEATING)), false)
            .await
        {
            self.repeating.lock().remove(&id);
            debug!(%id, "repeating query not started: {err}");
            return Err(err);
        }
        if !self.repeating.lock().confirm(&id) {
            debug!(%id, "repeating query acknowledged after it was dropped");
        }
        info!(%id, q = %message.q, frequency_hz, "repeating query started");
        Ok(())
    }

    /// Waits for the next reply on `id` equal to `expected`, skipping any
    /// other values the repeating query produces meanwhile.
    pub async fn wait_for_repeat_response(
        &self,
        id: impl Into<RequestId>,
        expected: impl Into<Value>,
    ) -> Result<Value, SessionError> {
        let pending = self
            .correlator
            .await_reply(id, Some(expected.into()), true)?;
        Ok(pending.await?.value())
    }

    /// Stops the repeating query `id` and forgets it once the peer confirms.
    pub async fn remove_query(&self, id: impl Into<RequestId>) -> Result<(), SessionError> {
        let id = id.into();
        self.stop(&id).await?;
        if !self.repeating.lock().remove(&id) {
            debug!(%id, "stopped an id that was not registered as repeating");
        }
        info!(%id, "repeating query stopped");
        Ok(())
    }

    /// Stops every running repeating query, one round-trip at a time.
    ///
    /// Only acknowledged queries are stopped; starts still in flight are left
    /// to their callers. A no-op when nothing is running. On failure the ids
    /// not yet stopped stay registered.
    pub async fn clean_up_repeating_queries(&self) -> Result<(), SessionError> {
        let ids = self.repeating.lock().running();
        if ids.is_empty() {
            return Ok(());
        }

        info!(count = ids.len(), "stopping repeating queries");
        for id in ids {
            self.stop(&id).await?;
            self.repeating.lock().remove(&id);
        }
        Ok(())
    }

    /// Subscribes to the event stream at `path` under the event namespace.
    ///
    /// With `polling`, failed attempts (send failures or any answer but
    /// `"bound"`) are retried every `bind_interval` until the source exists.
    pub async fn bind_to_event(
        &self,
        id: &str,
        path: &str,
        polling: bool,
    ) -> Result<(), SessionError> {
        let message = OutboundMessage::bind(RequestId::event(id), path);
        let bound = Value::from(BOUND);

        if polling {
            let (message, bound) = (&message, &bound);
            retry(
                RetryPolicy::forever(self.config.bind_interval),
                self.delay.as_ref(),
                SessionError::is_retryable,
                |attempt| async move {
                    trace!(id = %message.id, attempt, "bind attempt");
                    self.exchange(message, Some(bound.clone()), false).await
                },
            )
            .await?;
        } else {
            self.exchange(&message, Some(bound), false).await?;
        }

        info!(id = %message.id, q = %message.q, "event bound");
        Ok(())
    }

    /// Waits for the next payload on event `id` equal to `expected`.
    pub async fn wait_for_event(
        &self,
        id: &str,
        expected: impl Into<Value>,
    ) -> Result<Value, SessionError> {
        let pending =
            self.correlator
                .await_reply(RequestId::event(id), Some(expected.into()), true)?;
        Ok(pending.await?.value())
    }

    /// Cancels the event binding `id` on the peer.
    pub async fn unbind_event(&self, id: &str) -> Result<(), SessionError> {
        let id = RequestId::event(id);
        self.stop(&id).await?;
        info!(%id, "event unbound");
        Ok(())
    }

    /// Tears the session down: fails every outstanding waiter, stops the
    /// acknowledged repeating queries if the socket is still up and closes
    /// the transport.
    ///
    /// Starts and waits in flight fail with `Closed` before anything else
    /// happens, so teardown never waits on them.
    pub async fn close(&self) -> Result<(), SessionError> {
        let mut failed = self.correlator.clear();
        let stopped = if self.transport.is_ready() {
            self.clean_up_repeating_queries().await
        } else {
            Ok(())
        };
        self.repeating.lock().clear();
        failed += self.correlator.clear();
        self.transport.close();
        info!(failed, "session closed");
        stopped
    }

    /// The stop acknowledgment may trail values the stream already emitted,
    /// so it is awaited with a repeating waiter.
    async fn stop(&self, id: &RequestId) -> Result<Reply, SessionError> {
        let message = OutboundMessage::stop(id.clone());
        self.exchange(&message, Some(Value::from(STOPPED)), true)
            .await
    }

    async fn exchange(
        &self,
        message: &OutboundMessage,
        expected: Option<Value>,
        repeating: bool,
    ) -> Result<Reply, SessionError> {
        if !self.transport.is_ready() {
            return Err(SessionError::TransportUnavailable);
        }
        let frame = message.to_json()?;
        let pending = self
            .correlator
            .await_reply(message.id.clone(), expected, repeating)?;

        if let Err(err) = self.transport.send(frame) {
            self.correlator.withdraw(&pending);
            return Err(match err {
                TransportError::Unavailable => SessionError::TransportUnavailable,
                other => other.into(),
            });
        }
        debug!(id = %message.id, q = %message.q, "sent");

        Ok(pending.await?)
    }
}
