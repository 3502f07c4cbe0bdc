//! Keyword-triggered auto replies with a per-rule cooldown.
//!
//! A rule textually matches a comment when any of its trigger keywords is a
//! substring of the text (case-sensitive). The first matching rule consumes
//! the call: if it is still cooling down, no reply is produced and later
//! rules are not consulted. Cooldown entries are keyed by the stable rule
//! id, created on first fire, updated on every fire, never deleted.
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Minimum elapsed time before the same rule may fire again.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyRule {
    /// Stable identifier; doubles as the cooldown key.
    pub id:       String,
    /// Case-sensitive substrings, any of which triggers the rule.
    pub triggers: Vec<String>,
    /// Candidate replies; one is chosen uniformly at random per fire.
    pub replies:  Vec<String>,
}

/// Rules shipped with the relay — the sea-urchin stream FAQ. Used whenever
/// the config file does not define its own table.
pub static DEFAULT_RULES: Lazy<Vec<ReplyRule>> = Lazy::new(|| {
    vec![
        ReplyRule {
            id:       "what-is".to_owned(),
            triggers: vec!["这是什么".to_owned(), "1".to_owned()],
            replies:  vec!["海里生海里长的小动物，马粪海胆".to_owned()],
        },
        ReplyRule {
            id:       "gender".to_owned(),
            triggers: vec!["公".to_owned(), "母".to_owned(), "2".to_owned()],
            replies:  vec!["海胆黄颜色比较深的是母海胆，海胆黄发白浅色的是公海胆".to_owned()],
        },
        ReplyRule {
            id:       "how-to-eat".to_owned(),
            triggers: vec!["怎么吃".to_owned(), "3".to_owned()],
            replies:  vec![
                "海胆黄是可以直接吃的".to_owned(),
                "拌面拌饭，炒饭炒面，包个包子、饺子都是可以的".to_owned(),
            ],
        },
    ]
});

// ---------------------------------------------------------------------------
// Cooldown tracking
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_fired: HashMap<String, Instant>,
}

impl CooldownTracker {
    pub fn can_fire(&self, rule_id: &str, now: Instant, window: Duration) -> bool {
        match self.last_fired.get(rule_id) {
            Some(last) => now.saturating_duration_since(*last) >= window,
            None => true,
        }
    }

    pub fn mark_fired(&mut self, rule_id: &str, now: Instant) {
        self.last_fired.insert(rule_id.to_owned(), now);
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ReplyMatcher {
    rules:     Vec<ReplyRule>,
    cooldowns: CooldownTracker,
    window:    Duration,
}

impl ReplyMatcher {
    pub fn new(rules: Vec<ReplyRule>, window: Duration) -> Self {
        Self { rules, cooldowns: CooldownTracker::default(), window }
    }

    pub fn with_default_rules() -> Self {
        Self::new(DEFAULT_RULES.clone(), DEFAULT_COOLDOWN)
    }

    /// Zero or one reply for `text` at time `now`.
    ///
    /// Rules are tried in declaration order and the first textual match
    /// wins the call: a matching rule on cooldown returns `None` without
    /// consulting the rest of the table, and does not refresh its
    /// last-fired time.
    pub fn match_reply(&mut self, text: &str, now: Instant) -> Option<String> {
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.triggers.iter().any(|trigger| text.contains(trigger.as_str())))?;
        if !self.cooldowns.can_fire(&rule.id, now, self.window) {
            return None;
        }
        self.cooldowns.mark_fired(&rule.id, now);
        rule.replies.choose(&mut rand::thread_rng()).cloned()
    }
}
