//! Shared helpers for the quire command-line client.

use anyhow::{Context, Result};
use quire_client::ClientConfig;
use quire_store::{CacheEntry, EntryState, MutationOutcome, Session};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Loads the config file if one is given, then applies the base URL override.
pub fn load_config(path: Option<&Path>, base_url: Option<String>) -> Result<ClientConfig> {
    let mut config = match path {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(base_url) = base_url {
        config.base_url = base_url;
        config.validate().context("Invalid --base-url")?;
    }
    Ok(config)
}

/// Reads a session saved by a previous `login`.
pub fn load_session(path: &Path) -> Result<Option<Session>> {
    if !path.exists() {
        return Ok(None);
    }
    debug!("Loading session from {:?}", path);
    let bytes = fs::read(path).context("Failed to read session file")?;
    let session = serde_json::from_slice(&bytes).context("Failed to decode session file")?;
    Ok(Some(session))
}

pub fn save_session(path: &Path, session: &Session) -> Result<()> {
    info!("Saving session to {:?}", path);
    let bytes = serde_json::to_vec_pretty(session).context("Failed to encode session")?;
    fs::write(path, bytes).context("Failed to write session file")
}

/// Deletes the session file. Returns false if there was none.
pub fn clear_session(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path).context("Failed to remove session file")?;
    Ok(true)
}

fn state_marker(state: EntryState) -> &'static str {
    match state {
        EntryState::Fresh => "",
        EntryState::Stale => " (stale)",
        EntryState::Pending => " (pending)",
        EntryState::Error => " (refresh failed)",
    }
}

/// `<id>  <title>` plus a marker for entries not confirmed fresh.
pub fn article_line(entry: &CacheEntry) -> String {
    let title = entry.value["title"].as_str().unwrap_or("(untitled)");
    format!("{}  {}{}", entry.key.id(), title, state_marker(entry.state))
}

/// `[x] <message>` for read notifications, `[ ]` for unread ones.
pub fn notification_line(entry: &CacheEntry) -> String {
    let read = entry.value["read"].as_bool().unwrap_or(false);
    let message = entry.value["message"].as_str().unwrap_or("");
    format!(
        "[{}] {}  {}{}",
        if read { "x" } else { " " },
        entry.key.id(),
        message,
        state_marker(entry.state)
    )
}

pub fn outcome_line(what: &str, outcome: &MutationOutcome) -> String {
    match outcome {
        MutationOutcome::Committed => format!("{what}: done"),
        MutationOutcome::RolledBack(failed) => format!("{what}: failed ({})", failed.cause),
    }
}
