//! Comment watcher — polls the source, detects the newly appended suffix,
//! and emits broadcast messages plus keyword auto-replies.
//!
//! The loop is a single task that owns all watcher state; control arrives
//! over a command channel that is `select!`ed against the inter-tick sleep,
//! so pause/stop land promptly instead of waiting out a blocking sleep.
//! State machine: Stopped → Running ⇄ Paused → Stopped (terminal).
use crate::differ;
use crate::message::Message;
use crate::reply::ReplyMatcher;
use crate::sink::WatcherEvent;
use crate::source::{CommentSource, Snapshot};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, Sender, UnboundedReceiver, UnboundedSender};
use tokio::time;

#[derive(Debug)]
enum Command {
    Pause,
    Resume,
    SetInterval(Duration),
    Stop,
}

pub struct CommentWatcher;

impl CommentWatcher {
    /// Spawn the poll loop in the Running state. The first tick happens
    /// immediately; the full first snapshot is reported as new.
    pub fn start<S: CommentSource>(
        source:        S,
        matcher:       ReplyMatcher,
        poll_interval: Duration,
        out_tx:        Sender<Message>,
        event_tx:      UnboundedSender<WatcherEvent>,
    ) -> WatcherHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_loop(source, matcher, poll_interval, out_tx, event_tx, cmd_rx));
        WatcherHandle { cmd_tx }
    }
}

/// Control surface for a running watcher. All methods are callable from
/// any task; once the watcher is stopped they become no-ops.
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl WatcherHandle {
    pub fn pause(&self) {
        let _ = self.cmd_tx.send(Command::Pause);
    }

    pub fn resume(&self) {
        let _ = self.cmd_tx.send(Command::Resume);
    }

    /// New interval for subsequent ticks; an in-progress sleep keeps its
    /// original deadline.
    pub fn set_interval(&self, interval: Duration) {
        let _ = self.cmd_tx.send(Command::SetInterval(interval));
    }

    /// Terminal for this watcher instance.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(Command::Stop);
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

async fn run_loop<S: CommentSource>(
    mut source:   S,
    mut matcher:  ReplyMatcher,
    mut interval: Duration,
    out_tx:       Sender<Message>,
    event_tx:     UnboundedSender<WatcherEvent>,
    mut cmd_rx:   UnboundedReceiver<Command>,
) {
    let mut last_snapshot: Snapshot = Vec::new();
    let mut paused = false;

    'ticks: loop {
        if paused {
            // No polling while paused; only control traffic wakes us.
            match cmd_rx.recv().await {
                Some(Command::Resume) => paused = false,
                Some(Command::Pause) => {}
                Some(Command::SetInterval(new_interval)) => interval = new_interval,
                Some(Command::Stop) | None => break 'ticks,
            }
            continue;
        }

        match source.fetch_snapshot().await {
            Ok(current) => {
                let outcome = differ::diff(&last_snapshot, &current);
                if outcome.anchor_missing {
                    tracing::warn!(
                        "Previous snapshot anchor missing — re-emitting all {} items",
                        outcome.new_items.len()
                    );
                }
                for item in outcome.new_items {
                    let message = Message::new(item.text.clone(), item.author.clone());
                    if out_tx.send(message).await.is_err() {
                        break 'ticks; // broadcast side gone — shut down
                    }
                    if let Some(reply) = matcher.match_reply(&item.text, Instant::now()) {
                        if out_tx.send(Message::system(reply)).await.is_err() {
                            break 'ticks;
                        }
                    }
                }
                last_snapshot = current;
            }
            Err(e) => {
                tracing::warn!("Snapshot fetch failed: {} — tick skipped", e);
                let _ = event_tx.send(WatcherEvent::SourceUnavailable(e.to_string()));
            }
        }

        // Sleep out the interval while staying responsive to control
        // traffic. SetInterval applies from the next sleep onward.
        let deadline = time::Instant::now() + interval;
        loop {
            tokio::select! {
                _ = time::sleep_until(deadline) => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Pause) => {
                        paused = true;
                        break;
                    }
                    Some(Command::Resume) => {}
                    Some(Command::SetInterval(new_interval)) => interval = new_interval,
                    Some(Command::Stop) | None => break 'ticks,
                },
            }
        }
    }

    tracing::info!("Comment watcher stopped");
}
