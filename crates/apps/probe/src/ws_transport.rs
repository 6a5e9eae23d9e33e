//! WebSocket transport for the query session.
//!
//! One writer task drains an outbound channel into the socket; one reader task
//! parses text frames into `InboundMessage`s and forwards them to the receiver
//! returned by [`WsTransport::connect`]. Readiness drops as soon as either
//! task stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use foundation::{retry, Delay, RetryPolicy};
use futures_util::{SinkExt, StreamExt};
use protocol::InboundMessage;
use session::{Transport, TransportError};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

const INBOUND_BUFFER: usize = 256;

#[derive(Debug)]
pub struct WsTransport {
    url: String,
    ready: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl WsTransport {
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::Receiver<InboundMessage>), TransportError> {
        let (socket, _response) =
            connect_async(url)
                .await
                .map_err(|e| TransportError::Connect {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        let (mut ws_tx, mut ws_rx) = socket.split();

        let ready = Arc::new(AtomicBool::new(true));
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (in_tx, in_rx) = mpsc::channel::<InboundMessage>(INBOUND_BUFFER);

        let writer_ready = ready.clone();
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = ws_tx.send(msg).await {
                    warn!("ws send failed: {e}");
                    break;
                }
                if closing {
                    break;
                }
            }
            writer_ready.store(false, Ordering::SeqCst);
        });

        let reader_ready = ready.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                let msg = match msg {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("ws receive error: {e}");
                        break;
                    }
                };

                match msg {
                    Message::Text(text) => match InboundMessage::from_json(&text) {
                        Ok(inbound) => {
                            if in_tx.send(inbound).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("skipping unparseable frame: {e}"),
                    },
                    Message::Close(_) => {
                        info!("ws closed by peer");
                        break;
                    }
                    // Pings are answered by tungstenite itself.
                    _ => {}
                }
            }
            reader_ready.store(false, Ordering::SeqCst);
        });

        info!(url, "connected");
        Ok((
            Self {
                url: url.to_string(),
                ready,
                outbound: out_tx,
            },
            in_rx,
        ))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WsTransport {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn send(&self, frame: String) -> Result<(), TransportError> {
        if !self.is_ready() {
            return Err(TransportError::Unavailable);
        }
        self.outbound
            .send(Message::Text(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        if self.ready.swap(false, Ordering::SeqCst) {
            debug!(url = %self.url, "closing socket");
            let _ = self.outbound.send(Message::Close(None));
        }
    }
}

/// Connects to `url`, retrying on failure according to `policy`.
pub async fn connect_with_retry(
    url: &str,
    policy: RetryPolicy,
    delay: &dyn Delay,
) -> Result<(WsTransport, mpsc::Receiver<InboundMessage>), TransportError> {
    retry(policy, delay, |_| true, |attempt| async move {
        debug!(url, attempt, "connecting");
        WsTransport::connect(url).await
    })
    .await
}
