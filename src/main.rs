//! Headless operator console for the relay.
//!
//! The production comment source — the browser scraper — plugs in through
//! [`live_comment_relay::source::CommentSource`] and ships separately.
//! This binary runs the subscriber-facing half on its own: websocket hub,
//! optional periodic announcement, event sink. Every line typed on stdin
//! is broadcast under the system identity, standing in for the control
//! panel's send box.
use anyhow::Result;
use live_comment_relay::{announcer, config, hub::BroadcastHub, message::Message, sink};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("relay.toml"));
    let cfg = config::load_or_default(&config_path)?;
    live_comment_relay::init_tracing(&cfg);
    tracing::info!("Live comment relay starting — config {}", config_path.display());

    let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
    let (hub_event_tx, hub_event_rx) = mpsc::unbounded_channel();
    let (_watcher_event_tx, watcher_event_rx) = mpsc::unbounded_channel();

    let hub = BroadcastHub::new(hub_event_tx);
    let hub_handle = hub.start(&cfg.bind_address, cfg.port).await?;

    let announcer_handle = cfg.announcement.as_ref().map(|announcement| {
        announcer::start(
            announcement.text.clone(),
            Duration::from_secs_f64(announcement.interval_secs),
            out_tx.clone(),
        )
    });

    tokio::spawn(sink::run(hub_event_rx, watcher_event_rx));

    let fan_out = hub_handle.clone();
    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            fan_out.broadcast(&message);
        }
    });

    // Operator console: every stdin line goes out under the system identity.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        let _ = out_tx.send(Message::system(trimmed.to_owned())).await;
                    }
                }
                Ok(None) | Err(_) => {
                    // stdin closed (daemonized run) — wait for the signal.
                    tokio::signal::ctrl_c().await?;
                    break;
                }
            },
        }
    }

    tracing::info!("Shutting down");
    if let Some(announcer_handle) = &announcer_handle {
        announcer_handle.stop();
    }
    hub_handle.stop();
    Ok(())
}
