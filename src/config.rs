//! Application configuration — TOML file loaded at startup.
//!
//! Reply rules live in the file so stream operators can edit trigger
//! keywords and canned replies without a rebuild. The table is validated
//! at load time; a malformed rule aborts startup before anything binds or
//! polls.
use crate::reply::ReplyRule;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Optional fixed message broadcast on a timer, independent of the comment
/// stream (the operator's recurring pitch line).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub text:          String,
    pub interval_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the websocket listener binds. All interfaces by default so
    /// phones on the same LAN can pair.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between comment-list polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,

    /// Minimum seconds before the same reply rule may fire again.
    #[serde(default = "default_reply_cooldown")]
    pub reply_cooldown_secs: f64,

    /// Directory for daily-rolling log files. Empty = stderr only.
    #[serde(default)]
    pub log_dir: PathBuf,

    /// Keyword-triggered auto replies. Empty = use the built-in table.
    #[serde(default)]
    pub reply_rules: Vec<ReplyRule>,

    #[serde(default)]
    pub announcement: Option<Announcement>,
}

fn default_bind_address() -> String { "0.0.0.0".to_owned() }
fn default_port() -> u16 { 8765 }
fn default_poll_interval() -> f64 { 1.0 }
fn default_reply_cooldown() -> f64 { 5.0 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address:        default_bind_address(),
            port:                default_port(),
            poll_interval_secs:  default_poll_interval(),
            reply_cooldown_secs: default_reply_cooldown(),
            log_dir:             PathBuf::new(),
            reply_rules:         Vec::new(),
            announcement:        None,
        }
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

pub fn load_or_default(path: &Path) -> Result<AppConfig> {
    let cfg = if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("Config parse error: {}", e))?
    } else {
        AppConfig::default()
    };
    validate(&cfg)?;
    Ok(cfg)
}

pub fn save(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let raw = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("Config serialize error: {}", e))?;
    std::fs::write(path, raw)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(cfg: &AppConfig) -> Result<()> {
    if cfg.poll_interval_secs <= 0.0 {
        bail!("poll_interval_secs must be positive, got {}", cfg.poll_interval_secs);
    }
    if cfg.reply_cooldown_secs < 0.0 {
        bail!("reply_cooldown_secs must not be negative, got {}", cfg.reply_cooldown_secs);
    }

    let mut seen_ids = std::collections::HashSet::new();
    for rule in &cfg.reply_rules {
        if rule.id.is_empty() {
            bail!("reply rule with empty id");
        }
        if !seen_ids.insert(rule.id.as_str()) {
            bail!("duplicate reply rule id '{}'", rule.id);
        }
        if rule.triggers.is_empty() || rule.triggers.iter().any(String::is_empty) {
            bail!("reply rule '{}' needs at least one non-empty trigger", rule.id);
        }
        if rule.replies.is_empty() {
            bail!("reply rule '{}' has no replies", rule.id);
        }
    }

    if let Some(announcement) = &cfg.announcement {
        if announcement.text.is_empty() {
            bail!("announcement text is empty");
        }
        if announcement.interval_secs <= 0.0 {
            bail!(
                "announcement interval_secs must be positive, got {}",
                announcement.interval_secs
            );
        }
    }

    Ok(())
}
