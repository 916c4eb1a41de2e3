//! WebSocket transport to the dictation backend
//!
//! One persistent connection, owned by a background task. The task connects,
//! pumps frames and control messages out and parsed events in, and on any
//! close — server close, network drop, connect failure — schedules exactly
//! one reconnection attempt after a fixed delay, indefinitely.
//!
//! Sends are never buffered across a down channel: frames attempted while
//! the socket is closed are dropped (audio is only meaningful in near-real
//! time; a late resend would desynchronize the timeline), and anything
//! queued while the channel is down is discarded — once before the retry
//! delay and once more after the handshake, so a fresh backend session
//! never receives a control message from before the disconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::audio::Frame;
use crate::config::ClientConfig;
use crate::protocol::{ControlMessage, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Queued outbound messages between the session loop and the socket task.
const OUTBOUND_CAPACITY: usize = 64;

/// Inbound event queue toward the session loop.
const EVENT_CAPACITY: usize = 100;

/// Events surfaced by the transport task, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Socket established. Does not by itself advance the connection phase;
    /// the backend reports readiness through status events.
    Opened,
    /// Socket closed for any reason. A reconnect is already scheduled.
    Closed,
    /// A parsed inbound event.
    Server(ServerEvent),
}

#[derive(Debug)]
enum Outbound {
    Frame(Frame),
    Control(ControlMessage),
}

/// Outbound surface of the channel. A trait so the session loop can be
/// exercised in tests with a recording sink.
pub trait OutboundSink: Send + 'static {
    /// Transmit one audio frame's raw bytes if the channel is currently
    /// open; otherwise the frame is dropped.
    fn send_frame(&self, frame: Frame);

    /// Serialize and send a control message as text. Best-effort: attempted
    /// even around channel loss and allowed to fail silently.
    fn send_control(&self, message: ControlMessage);
}

/// Handle to the persistent connection.
pub struct TransportChannel {
    outbound_tx: mpsc::Sender<Outbound>,
    connected: Arc<AtomicBool>,
}

impl TransportChannel {
    /// Spawn the connection task and return the handle plus the inbound
    /// event stream.
    pub fn open(config: &ClientConfig) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_channel(
            config.ws_url(),
            config.reconnect_delay,
            outbound_rx,
            event_tx,
            connected.clone(),
        ));

        (
            Self {
                outbound_tx,
                connected,
            },
            event_rx,
        )
    }

    pub fn is_open(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl OutboundSink for TransportChannel {
    fn send_frame(&self, frame: Frame) {
        if !self.is_open() {
            log::debug!(
                "Transport: channel closed, dropping {}-sample frame",
                frame.len()
            );
            return;
        }
        if self.outbound_tx.try_send(Outbound::Frame(frame)).is_err() {
            log::warn!("Transport: outbound queue full, dropping frame");
        }
    }

    fn send_control(&self, message: ControlMessage) {
        if self.outbound_tx.try_send(Outbound::Control(message)).is_err() {
            log::debug!("Transport: control message dropped");
        }
    }
}

/// Connection task: connect, pump, reconnect after the fixed delay, forever.
/// Connect errors and mid-session closes funnel into the same retry path.
async fn run_channel(
    url: String,
    reconnect_delay: Duration,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    event_tx: mpsc::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
) {
    loop {
        log::info!("Transport: connecting to {}", url);
        let mut ws = match connect_async(url.as_str()).await {
            Ok((ws, _response)) => ws,
            Err(e) => {
                log::warn!("Transport: connect failed: {}", e);
                if !wait_retry(&mut outbound_rx, reconnect_delay).await {
                    return;
                }
                continue;
            }
        };

        // Anything enqueued during the retry delay or the handshake is
        // stale; a fresh backend session must never see it.
        if !discard_queued(&mut outbound_rx) {
            let _ = ws.close(None).await;
            return;
        }

        connected.store(true, Ordering::Relaxed);
        log::info!("Transport: channel open");
        if event_tx.send(TransportEvent::Opened).await.is_err() {
            return;
        }

        let end = pump(ws, &mut outbound_rx, &event_tx).await;
        connected.store(false, Ordering::Relaxed);

        if matches!(end, PumpEnd::Shutdown) {
            return;
        }
        if event_tx.send(TransportEvent::Closed).await.is_err() {
            return;
        }
        if !wait_retry(&mut outbound_rx, reconnect_delay).await {
            return;
        }
    }
}

enum PumpEnd {
    /// Socket closed or errored; reconnect.
    Closed,
    /// All handles dropped; the process is going away.
    Shutdown,
}

async fn pump(
    mut ws: WsStream,
    outbound_rx: &mut mpsc::Receiver<Outbound>,
    event_tx: &mpsc::Sender<TransportEvent>,
) -> PumpEnd {
    loop {
        tokio::select! {
            out = outbound_rx.recv() => match out {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = ws.send(Message::Binary(frame.to_le_bytes())).await {
                        log::warn!("Transport: frame send failed: {}", e);
                        return PumpEnd::Closed;
                    }
                }
                Some(Outbound::Control(message)) => {
                    match serde_json::to_string(&message) {
                        Ok(json) => {
                            if let Err(e) = ws.send(Message::Text(json)).await {
                                log::warn!("Transport: control send failed: {}", e);
                                return PumpEnd::Closed;
                            }
                        }
                        Err(e) => log::warn!("Transport: control serialization failed: {}", e),
                    }
                }
                None => {
                    let _ = ws.close(None).await;
                    return PumpEnd::Shutdown;
                }
            },
            inbound = ws.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if event_tx.send(TransportEvent::Server(event)).await.is_err() {
                                return PumpEnd::Shutdown;
                            }
                        }
                        // Fatal to that message only: drop and continue.
                        Err(e) => log::warn!("Transport: dropping malformed event: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    log::info!("Transport: closed by server");
                    return PumpEnd::Closed;
                }
                Some(Ok(_)) => {} // ping/pong/binary ignored
                Some(Err(e)) => {
                    log::warn!("Transport: socket error: {}", e);
                    return PumpEnd::Closed;
                }
                None => return PumpEnd::Closed,
            },
        }
    }
}

/// Wait out the fixed delay before the single scheduled reconnection
/// attempt. Outbound messages queued while the channel is down are dropped,
/// never replayed after reconnect. Returns false when all sender handles
/// are gone and the task should exit.
async fn wait_retry(outbound_rx: &mut mpsc::Receiver<Outbound>, reconnect_delay: Duration) -> bool {
    if !discard_queued(outbound_rx) {
        return false;
    }
    tokio::time::sleep(reconnect_delay).await;
    true
}

/// Empty the outbound queue, dropping every stale message. Returns false
/// when all sender handles are gone and the task should exit.
fn discard_queued(outbound_rx: &mut mpsc::Receiver<Outbound>) -> bool {
    loop {
        match outbound_rx.try_recv() {
            Ok(dropped) => {
                log::debug!("Transport: discarding queued {:?} while disconnected", dropped)
            }
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}
