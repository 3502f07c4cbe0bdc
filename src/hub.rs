//! Broadcast hub — owns the live subscriber set and fan-out delivery.
//!
//! Every subscriber is a websocket connection keyed by its remote address.
//! Delivery is decoupled per subscriber: `broadcast` snapshots the live set
//! under the lock and hands each member its frame through an outbound
//! channel, so one slow socket never stalls the caller or the rest of the
//! set. A failed handoff means the connection is already gone and is
//! treated as an implicit disconnect.
//!
//! The lock guards only map mutation and the snapshot copy; it is never
//! held across an await point.
use crate::message::Message;
use crate::sink::HubEvent;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to bind websocket listener: {0}")]
    Bind(#[from] std::io::Error),
    /// One hub, one listener: starting a running hub is refused rather
    /// than silently ignored so the operator surface can report it.
    #[error("hub is already running")]
    AlreadyRunning,
}

type LiveSet = Arc<Mutex<HashMap<SocketAddr, UnboundedSender<WsMessage>>>>;

fn lock(live: &LiveSet) -> MutexGuard<'_, HashMap<SocketAddr, UnboundedSender<WsMessage>>> {
    live.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

pub struct BroadcastHub {
    live:     LiveSet,
    event_tx: UnboundedSender<HubEvent>,
    running:  Arc<AtomicBool>,
}

impl BroadcastHub {
    pub fn new(event_tx: UnboundedSender<HubEvent>) -> Self {
        Self {
            live:     Arc::new(Mutex::new(HashMap::new())),
            event_tx,
            running:  Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind the listener and begin accepting subscribers. Port 0 binds an
    /// ephemeral port; the actual address is on the returned handle.
    pub async fn start(&self, bind_address: &str, port: u16) -> Result<HubHandle, HubError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HubError::AlreadyRunning);
        }
        match self.try_start(bind_address, port).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn try_start(&self, bind_address: &str, port: u16) -> Result<HubHandle, HubError> {
        let listener = TcpListener::bind((bind_address, port)).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Websocket hub listening on ws://{}", local_addr);

        let accept_task =
            tokio::spawn(accept_loop(listener, self.live.clone(), self.event_tx.clone()));

        Ok(HubHandle {
            live:        self.live.clone(),
            event_tx:    self.event_tx.clone(),
            running:     self.running.clone(),
            local_addr,
            accept_task: Arc::new(accept_task),
        })
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Operator surface for a running hub. Cloneable; `stop` is callable from
/// any task and is a no-op once the hub is down.
#[derive(Clone)]
pub struct HubHandle {
    live:        LiveSet,
    event_tx:    UnboundedSender<HubEvent>,
    running:     Arc<AtomicBool>,
    local_addr:  SocketAddr,
    accept_task: Arc<JoinHandle<()>>,
}

impl HubHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.live).len()
    }

    /// Deliver `message` to every subscriber live at call time.
    ///
    /// Handoff to each subscriber's writer completes before this returns;
    /// the socket writes themselves proceed asynchronously per subscriber.
    /// A dead subscriber is removed as an implicit disconnect and never
    /// aborts delivery to the rest.
    pub fn broadcast(&self, message: &Message) {
        let wire = message.to_wire();
        let targets: Vec<(SocketAddr, UnboundedSender<WsMessage>)> = {
            let live = lock(&self.live);
            live.iter().map(|(addr, tx)| (*addr, tx.clone())).collect()
        };
        for (addr, tx) in targets {
            if tx.send(WsMessage::Text(wire.clone())).is_err() {
                self.remove_subscriber(addr);
            }
        }
    }

    /// Operator free-text broadcast under the system identity.
    pub fn broadcast_text(&self, content: impl Into<String>) {
        self.broadcast(&Message::system(content));
    }

    /// Stop accepting and close every live connection.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.accept_task.abort();
        let drained: Vec<_> = lock(&self.live).drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(WsMessage::Close(None));
        }
        tracing::info!("Websocket hub stopped");
    }

    fn remove_subscriber(&self, addr: SocketAddr) {
        if lock(&self.live).remove(&addr).is_some() {
            let _ = self.event_tx.send(HubEvent::Disconnected(addr));
        }
    }
}

// ---------------------------------------------------------------------------
// Accept / per-connection plumbing
// ---------------------------------------------------------------------------

async fn accept_loop(listener: TcpListener, live: LiveSet, event_tx: UnboundedSender<HubEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(stream, addr, live.clone(), event_tx.clone()));
            }
            Err(e) => {
                // Transient accept failures (fd exhaustion, aborted
                // handshakes) — keep serving.
                tracing::warn!("Accept error: {}", e);
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    live: LiveSet,
    event_tx: UnboundedSender<HubEvent>,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!("Websocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();

    // Register before the welcome frame so a broadcast racing the
    // handshake still reaches this subscriber.
    lock(&live).insert(addr, out_tx.clone());
    let _ = event_tx.send(HubEvent::Connected(addr));
    let _ = out_tx.send(WsMessage::Text(Message::welcome().to_wire()));

    // Writer task owns the sink half; a slow socket blocks only itself.
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let closing = matches!(frame, WsMessage::Close(_));
            if ws_tx.send(frame).await.is_err() || closing {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // Reader loop: inbound text is surfaced verbatim, never interpreted.
    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                let _ = event_tx.send(HubEvent::Inbound(text));
            }
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => {} // binary / ping / pong — ignored
        }
    }

    // Cleanup runs on every close outcome: normal close, protocol error,
    // or connection reset. No stale entry may survive this point.
    let removed = lock(&live).remove(&addr).is_some();
    writer.abort();
    if removed {
        let _ = event_tx.send(HubEvent::Disconnected(addr));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Error as WsError;
    use tokio_tungstenite::connect_async;

    const WAIT: Duration = Duration::from_secs(5);

    async fn start_hub() -> (BroadcastHub, HubHandle, UnboundedReceiver<HubEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let hub = BroadcastHub::new(event_tx);
        let handle = hub.start("127.0.0.1", 0).await.expect("hub should bind");
        (hub, handle, event_rx)
    }

    async fn recv_event(rx: &mut UnboundedReceiver<HubEvent>) -> HubEvent {
        timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for hub event")
            .expect("event channel closed")
    }

    async fn recv_text<S>(ws: &mut S) -> String
    where
        S: StreamExt<Item = Result<WsMessage, WsError>> + Unpin,
    {
        loop {
            let frame = timeout(WAIT, ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .expect("websocket error");
            if let WsMessage::Text(text) = frame {
                return text;
            }
        }
    }

    #[tokio::test]
    async fn welcome_frame_greets_new_subscriber() {
        let (_hub, handle, _event_rx) = start_hub().await;
        let url = format!("ws://{}", handle.local_addr());

        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        assert_eq!(recv_text(&mut ws).await, Message::welcome().to_wire());
        handle.stop();
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let (_hub, handle, mut event_rx) = start_hub().await;
        let url = format!("ws://{}", handle.local_addr());

        let (mut ws_a, _) = connect_async(url.as_str()).await.unwrap();
        let (mut ws_b, _) = connect_async(url.as_str()).await.unwrap();
        recv_text(&mut ws_a).await; // welcome
        recv_text(&mut ws_b).await; // welcome
        recv_event(&mut event_rx).await;
        recv_event(&mut event_rx).await;
        assert_eq!(handle.subscriber_count(), 2);

        let message = Message::new("上新了", "主播");
        handle.broadcast(&message);
        assert_eq!(recv_text(&mut ws_a).await, message.to_wire());
        assert_eq!(recv_text(&mut ws_b).await, message.to_wire());
        handle.stop();
    }

    #[tokio::test]
    async fn lifecycle_events_arrive_in_order() {
        let (_hub, handle, mut event_rx) = start_hub().await;
        let url = format!("ws://{}", handle.local_addr());
        assert_eq!(handle.subscriber_count(), 0);

        let (mut ws_a, _) = connect_async(url.as_str()).await.unwrap();
        recv_text(&mut ws_a).await;
        let HubEvent::Connected(addr_a) = recv_event(&mut event_rx).await else {
            panic!("expected first connect event");
        };
        assert_eq!(handle.subscriber_count(), 1);

        let (mut ws_b, _) = connect_async(url.as_str()).await.unwrap();
        recv_text(&mut ws_b).await;
        assert!(matches!(recv_event(&mut event_rx).await, HubEvent::Connected(_)));
        assert_eq!(handle.subscriber_count(), 2);

        ws_a.close(None).await.unwrap();
        drop(ws_a);
        let HubEvent::Disconnected(gone) = recv_event(&mut event_rx).await else {
            panic!("expected disconnect event");
        };
        assert_eq!(gone, addr_a);
        assert_eq!(handle.subscriber_count(), 1);
        handle.stop();
    }

    #[tokio::test]
    async fn closed_subscriber_no_longer_receives() {
        let (_hub, handle, mut event_rx) = start_hub().await;
        let url = format!("ws://{}", handle.local_addr());

        let (mut ws_a, _) = connect_async(url.as_str()).await.unwrap();
        let (mut ws_b, _) = connect_async(url.as_str()).await.unwrap();
        recv_text(&mut ws_a).await;
        recv_text(&mut ws_b).await;
        recv_event(&mut event_rx).await;
        recv_event(&mut event_rx).await;

        ws_a.close(None).await.unwrap();
        drop(ws_a);
        assert!(matches!(recv_event(&mut event_rx).await, HubEvent::Disconnected(_)));
        assert_eq!(handle.subscriber_count(), 1);

        // The survivor is still served.
        let message = Message::system("还在吗");
        handle.broadcast(&message);
        assert_eq!(recv_text(&mut ws_b).await, message.to_wire());
        handle.stop();
    }

    #[tokio::test]
    async fn inbound_text_is_surfaced_verbatim() {
        let (_hub, handle, mut event_rx) = start_hub().await;
        let url = format!("ws://{}", handle.local_addr());

        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        recv_text(&mut ws).await;
        recv_event(&mut event_rx).await; // connected

        ws.send(WsMessage::Text("弹幕机已就位".to_owned())).await.unwrap();
        match recv_event(&mut event_rx).await {
            HubEvent::Inbound(text) => assert_eq!(text, "弹幕机已就位"),
            other => panic!("expected inbound event, got {:?}", other),
        }
        handle.stop();
    }

    #[tokio::test]
    async fn second_start_is_refused_while_running() {
        let (hub, handle, _event_rx) = start_hub().await;
        let err = hub.start("127.0.0.1", 0).await.err().expect("start must fail");
        assert!(matches!(err, HubError::AlreadyRunning));
        handle.stop();
    }

    #[tokio::test]
    async fn bind_conflict_surfaces_as_error() {
        let (_hub, handle, _event_rx) = start_hub().await;
        let port = handle.local_addr().port();

        let (event_tx, _second_rx) = mpsc::unbounded_channel();
        let second = BroadcastHub::new(event_tx);
        let err = second.start("127.0.0.1", port).await.err().expect("bind must fail");
        assert!(matches!(err, HubError::Bind(_)));
        handle.stop();
    }

    #[tokio::test]
    async fn stop_closes_live_connections_and_is_idempotent() {
        let (_hub, handle, mut event_rx) = start_hub().await;
        let url = format!("ws://{}", handle.local_addr());

        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        recv_text(&mut ws).await;
        recv_event(&mut event_rx).await;

        handle.stop();
        handle.stop(); // no-op when already stopped
        assert_eq!(handle.subscriber_count(), 0);

        // The client observes the close within the timeout.
        let observed_close = timeout(WAIT, async {
            loop {
                match ws.next().await {
                    None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(observed_close.is_ok());
    }

    #[tokio::test]
    async fn hub_restarts_after_stop() {
        let (hub, handle, mut event_rx) = start_hub().await;
        handle.stop();

        let handle = hub.start("127.0.0.1", 0).await.expect("restart should bind");
        let url = format!("ws://{}", handle.local_addr());
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        assert_eq!(recv_text(&mut ws).await, Message::welcome().to_wire());
        assert!(matches!(recv_event(&mut event_rx).await, HubEvent::Connected(_)));
        handle.stop();
    }
}
