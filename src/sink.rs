//! Display sink — the observation surface for the (out-of-scope) control
//! panel. Hub lifecycle notifications and watcher health reports drain
//! here and come out as structured log lines; a GUI would subscribe to the
//! same channels instead.
use anyhow::Result;
use std::net::SocketAddr;
use tokio::sync::mpsc::UnboundedReceiver;

/// Raised by the broadcast hub as subscribers come and go.
#[derive(Debug, Clone)]
pub enum HubEvent {
    Connected(SocketAddr),
    Disconnected(SocketAddr),
    /// Raw inbound text from a subscriber, surfaced verbatim — the relay
    /// performs no interpretation of subscriber content.
    Inbound(String),
}

/// Raised by the comment watcher.
#[derive(Debug, Clone)]
pub enum WatcherEvent {
    /// A snapshot fetch failed; the tick was skipped and the loop goes on.
    SourceUnavailable(String),
}

/// Drains both event channels until every sender is gone.
pub async fn run(
    mut hub_rx:     UnboundedReceiver<HubEvent>,
    mut watcher_rx: UnboundedReceiver<WatcherEvent>,
) -> Result<()> {
    loop {
        tokio::select! {
            Some(event) = hub_rx.recv() => match event {
                HubEvent::Connected(addr) => {
                    tracing::info!("Subscriber connected: {}", addr);
                }
                HubEvent::Disconnected(addr) => {
                    tracing::info!("Subscriber disconnected: {}", addr);
                }
                HubEvent::Inbound(text) => {
                    tracing::info!("Inbound message: {}", text);
                }
            },
            Some(event) = watcher_rx.recv() => match event {
                WatcherEvent::SourceUnavailable(reason) => {
                    tracing::warn!("Comment source unavailable: {}", reason);
                }
            },
            else => break,
        }
    }
    Ok(())
}
