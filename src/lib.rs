//! Live-stream comment relay.
//!
//! Watches an externally scraped live-stream comment list, detects newly
//! appended comments, auto-replies to keyword triggers with a per-rule
//! cooldown, and fans every message out to websocket subscribers. The
//! browser scraper itself is out of tree — it plugs in through
//! [`source::CommentSource`].
pub mod announcer;
pub mod config;
pub mod differ;
pub mod hub;
pub mod message;
pub mod reply;
pub mod sink;
pub mod source;
pub mod watcher;

use anyhow::Result;
use config::AppConfig;
use hub::BroadcastHub;
use message::Message;
use reply::ReplyMatcher;
use source::CommentSource;
use std::time::Duration;
use tokio::sync::mpsc;
use watcher::CommentWatcher;

// ---------------------------------------------------------------------------
// Logging bootstrap
// ---------------------------------------------------------------------------

/// Install the global tracing subscriber: stderr by default, a daily
/// rolling file when `log_dir` is configured. Also routes panics through
/// tracing so they show up in production logs instead of a lost stderr.
pub fn init_tracing(cfg: &AppConfig) {
    let filter = || {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("live_comment_relay=info".parse().unwrap())
    };

    if cfg.log_dir.as_os_str().is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    } else {
        let _ = std::fs::create_dir_all(&cfg.log_dir);
        let file_appender = tracing_appender::rolling::daily(&cfg.log_dir, "relay.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Keep the guard alive for the process lifetime — drop = flush.
        std::mem::forget(guard);
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(non_blocking)
            .with_ansi(false) // log files should not contain ANSI colour codes
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_owned());
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        tracing::error!("PANIC at {}: {}", location, message);
    }));
}

// ---------------------------------------------------------------------------
// Pipeline wiring
// ---------------------------------------------------------------------------

/// Wire the full pipeline — hub, watcher, optional announcer, event sink —
/// and run until Ctrl-C.
pub async fn run<S: CommentSource>(cfg: AppConfig, source: S) -> Result<()> {
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
    let (hub_event_tx, hub_event_rx) = mpsc::unbounded_channel();
    let (watcher_event_tx, watcher_event_rx) = mpsc::unbounded_channel();

    let hub = BroadcastHub::new(hub_event_tx);
    let hub_handle = hub.start(&cfg.bind_address, cfg.port).await?;

    let rules = if cfg.reply_rules.is_empty() {
        reply::DEFAULT_RULES.clone()
    } else {
        cfg.reply_rules.clone()
    };
    let matcher = ReplyMatcher::new(rules, Duration::from_secs_f64(cfg.reply_cooldown_secs));
    let watcher_handle = CommentWatcher::start(
        source,
        matcher,
        Duration::from_secs_f64(cfg.poll_interval_secs),
        out_tx.clone(),
        watcher_event_tx,
    );

    let announcer_handle = cfg.announcement.as_ref().map(|announcement| {
        announcer::start(
            announcement.text.clone(),
            Duration::from_secs_f64(announcement.interval_secs),
            out_tx.clone(),
        )
    });
    drop(out_tx);

    tokio::spawn(sink::run(hub_event_rx, watcher_event_rx));

    // Fan pipeline messages into the hub.
    let fan_out = hub_handle.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            fan_out.broadcast(&message);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    watcher_handle.stop();
    if let Some(announcer_handle) = &announcer_handle {
        announcer_handle.stop();
    }
    hub_handle.stop();
    forwarder.abort();
    Ok(())
}
