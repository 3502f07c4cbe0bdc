//! Shared message model — the unit pushed to every subscriber.
//!
//! The wire format is a flat JSON object with exactly two string fields,
//! `content` and `nickName`. No envelope, no versioning: the paired phone
//! clients parse this shape directly, so the key names are load-bearing.
use serde::{Deserialize, Serialize};

/// Nickname stamped on every server-originated frame (welcome frame,
/// operator broadcasts, keyword auto-replies).
pub const SYSTEM_NICKNAME: &str = "websocket服务";

/// Content of the frame sent to a subscriber right after the websocket
/// handshake completes.
pub const WELCOME_CONTENT: &str = "已连接";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub content:   String,
    #[serde(rename = "nickName")]
    pub nick_name: String,
}

impl Message {
    pub fn new(content: impl Into<String>, nick_name: impl Into<String>) -> Self {
        Self { content: content.into(), nick_name: nick_name.into() }
    }

    /// A frame carrying `content` under the fixed system identity.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(content, SYSTEM_NICKNAME)
    }

    pub fn welcome() -> Self {
        Self::system(WELCOME_CONTENT)
    }

    /// Wire serialization. Two plain strings cannot fail to serialize, so
    /// the error arm collapses to an empty frame rather than propagating.
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
