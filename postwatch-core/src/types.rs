use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Marker written to the post log when a post has no stored media.
pub const NO_MEDIA_MARKER: &str = "No image";

/// The newest observable post for an account at poll time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSnapshot {
    /// Opaque id, unique within the account
    pub id: String,
    pub text: String,
    pub permalink: String,
    pub media_url: Option<String>,
}

/// One entry of the append-only post log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub account: String,
    pub text: String,
    pub permalink: String,
    pub media_path: Option<PathBuf>,
    pub timestamp: DateTime<Local>,
}

impl LogRecord {
    pub fn new(account: &str, snapshot: &PostSnapshot, media_path: Option<PathBuf>) -> Self {
        Self {
            account: account.to_string(),
            text: snapshot.text.clone(),
            permalink: snapshot.permalink.clone(),
            media_path,
            timestamp: Local::now(),
        }
    }

    pub fn media_display(&self) -> String {
        match &self.media_path {
            Some(path) => path.display().to_string(),
            None => NO_MEDIA_MARKER.to_string(),
        }
    }
}
