//! Periodic operator announcement.
//!
//! Broadcasts a fixed system message on a timer — the recurring pitch line
//! a stream operator would otherwise re-type. Feeds the same outbound
//! channel as the watcher so the hub treats both identically.
use crate::message::Message;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time;

#[derive(Debug)]
pub struct AnnouncerHandle {
    task: JoinHandle<()>,
}

impl AnnouncerHandle {
    pub fn stop(&self) {
        self.task.abort();
    }
}

/// Spawn the announcement timer. The first broadcast happens one full
/// interval after start, not immediately.
pub fn start(text: String, interval: Duration, out_tx: Sender<Message>) -> AnnouncerHandle {
    let task = tokio::spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            if out_tx.send(Message::system(text.clone())).await.is_err() {
                break; // broadcast side gone
            }
        }
    });
    AnnouncerHandle { task }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SYSTEM_NICKNAME;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn announces_repeatedly_at_the_interval() {
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let handle = start("新鲜海胆上架".to_owned(), Duration::from_millis(20), out_tx);

        for _ in 0..2 {
            let message = timeout(Duration::from_secs(5), out_rx.recv())
                .await
                .expect("timed out waiting for announcement")
                .expect("channel closed");
            assert_eq!(message.content, "新鲜海胆上架");
            assert_eq!(message.nick_name, SYSTEM_NICKNAME);
        }
        handle.stop();
    }

    #[tokio::test]
    async fn stop_silences_the_announcer() {
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let handle = start("循环播报".to_owned(), Duration::from_millis(20), out_tx);
        handle.stop();

        // The task drops its sender on abort; the channel drains to None.
        let closed = timeout(Duration::from_secs(5), async {
            while out_rx.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok(), "announcer kept running after stop");
    }
}
