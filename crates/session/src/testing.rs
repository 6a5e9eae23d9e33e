//! Scripted peer used by the session tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use foundation::{RecordingDelay, RequestId};
use parking_lot::Mutex;
use protocol::{BOUND, InboundMessage, OutboundMessage, Query, REPEATING, STOPPED};
use serde_json::json;
use tokio::sync::mpsc;

use crate::session::{Session, SessionConfig};
use crate::transport::{Transport, TransportError};

/// Produces the peer's replies to one outbound message. The second argument
/// counts sends of the same `(id, q)` pair, starting at 1.
type Responder = Box<dyn Fn(&OutboundMessage, usize) -> Vec<InboundMessage> + Send + Sync>;

pub(crate) struct ScriptedTransport {
    ready: AtomicBool,
    fail_all: AtomicBool,
    fail_ids: Mutex<Vec<RequestId>>,
    sent: Mutex<Vec<OutboundMessage>>,
    inbound: mpsc::Sender<InboundMessage>,
    responder: Responder,
}

impl ScriptedTransport {
    fn new(inbound: mpsc::Sender<InboundMessage>, responder: Responder) -> Self {
        Self {
            ready: AtomicBool::new(true),
            fail_all: AtomicBool::new(false),
            fail_ids: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            inbound,
            responder,
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    /// Delivers an unsolicited message, as a repeating query or event would.
    pub fn push(&self, msg: InboundMessage) {
        self.inbound.try_send(msg).expect("inbound buffer full");
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends_for(&self, id: &str) {
        self.fail_ids.lock().push(RequestId::new(id));
    }
}

impl Transport for ScriptedTransport {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn send(&self, frame: String) -> Result<(), TransportError> {
        if !self.is_ready() {
            return Err(TransportError::Unavailable);
        }
        let msg = OutboundMessage::from_json(&frame).expect("session sends valid JSON");
        if self.fail_all.load(Ordering::SeqCst) || self.fail_ids.lock().contains(&msg.id) {
            return Err(TransportError::Closed);
        }

        let attempt = {
            let mut sent = self.sent.lock();
            sent.push(msg.clone());
            sent.iter()
                .filter(|m| m.id == msg.id && m.q == msg.q)
                .count()
        };
        for reply in (self.responder)(&msg, attempt) {
            self.push(reply);
        }
        Ok(())
    }

    fn close(&self) {
        self.set_ready(false);
    }
}

/// The acknowledgment a well-behaved peer sends for control messages.
pub(crate) fn acknowledge(msg: &OutboundMessage) -> Option<InboundMessage> {
    let id = msg.id.clone();
    match msg.query()? {
        Query::Lookup(_) if msg.repeat.is_some() => {
            Some(InboundMessage::data(id, vec![json!(REPEATING)]))
        }
        Query::Lookup(_) => None,
        Query::Stop(_) => Some(InboundMessage::data(id, vec![json!(STOPPED)])),
        Query::Bind(_) => Some(InboundMessage::info(id, json!(BOUND))),
    }
}

pub(crate) struct Harness {
    pub session: Arc<Session>,
    pub transport: Arc<ScriptedTransport>,
    pub delay: Arc<RecordingDelay>,
}

impl Harness {
    pub fn start(
        responder: impl Fn(&OutboundMessage, usize) -> Vec<InboundMessage> + Send + Sync + 'static,
    ) -> Self {
        Self::start_with(SessionConfig::default(), responder)
    }

    pub fn start_with(
        config: SessionConfig,
        responder: impl Fn(&OutboundMessage, usize) -> Vec<InboundMessage> + Send + Sync + 'static,
    ) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let transport = Arc::new(ScriptedTransport::new(tx, Box::new(responder)));
        let delay = Arc::new(RecordingDelay::new());
        let session = Arc::new(
            Session::with_config(transport.clone(), config).with_delay(delay.clone()),
        );

        let pump = session.clone();
        tokio::spawn(async move { pump.pump(rx).await });

        Self {
            session,
            transport,
            delay,
        }
    }
}
