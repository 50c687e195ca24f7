//! Conversation persistence for the interactive shell.
//!
//! When the effective config keeps `history` on, the running conversation is
//! saved after each turn so `start --continue` can pick it back up.

use crate::error::Result;
use crate::providers::Message;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SESSION_FILE: &str = "session.json";

pub fn session_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SESSION_FILE)
}

/// Load the previous conversation, or an empty one if none was saved.
pub fn load(config_dir: &Path) -> Result<Vec<Message>> {
    let path = session_path(config_dir);
    if !path.exists() {
        debug!("No saved session at {}", path.display());
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(&path)?;
    let messages: Vec<Message> = serde_json::from_str(&content)?;
    info!("Resumed session with {} messages", messages.len());
    Ok(messages)
}

/// Persist the conversation, replacing any previous session.
pub fn save(config_dir: &Path, messages: &[Message]) -> Result<()> {
    fs::create_dir_all(config_dir)?;
    let path = session_path(config_dir);
    fs::write(&path, serde_json::to_string_pretty(messages)?)?;
    Ok(())
}
