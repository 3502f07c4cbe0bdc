//! The comment source boundary.
//!
//! The production driver — a browser-automation scraper reading the live
//! page — lives outside this crate. It implements [`CommentSource`] and
//! hands the watcher a full ordered snapshot on every poll; there is no
//! cursor or offset, the list always arrives wholesale.
use std::future::Future;
use thiserror::Error;

/// One comment as reported by the source. Equality over both fields is the
/// identity the snapshot differ anchors on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentItem {
    pub author: String,
    pub text:   String,
}

impl CommentItem {
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self { author: author.into(), text: text.into() }
    }
}

/// Everything the source currently reports, oldest first.
pub type Snapshot = Vec<CommentItem>;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The remote page could not be read this tick. Recoverable — the
    /// watcher reports it and retries on the next scheduled poll.
    #[error("comment source unavailable: {0}")]
    Unavailable(String),
}

pub trait CommentSource: Send + 'static {
    /// Full current comment list. May block on remote I/O; called at most
    /// once per watcher tick.
    fn fetch_snapshot(
        &mut self,
    ) -> impl Future<Output = Result<Snapshot, SourceError>> + Send;
}
