use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::session::Message;

/// One `"<Role> (<timestamp>): <content>"` line per message, in order.
pub fn export(messages: &[Message]) -> Vec<u8> {
    messages
        .iter()
        .map(|m| format!("{} ({}): {}", m.role.label(), m.display_timestamp(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
        .into_bytes()
}

pub fn export_filename(now: NaiveDateTime) -> String {
    format!("chat_history_{}.txt", now.format("%Y%m%d_%H%M%S"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl TranscriptArtifact {
    pub fn new(messages: &[Message], now: NaiveDateTime) -> Self {
        Self {
            filename: export_filename(now),
            bytes: export(messages),
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:text/plain;base64,{}", STANDARD.encode(&self.bytes))
    }

    pub fn download_link(&self) -> DownloadLink {
        DownloadLink {
            filename: self.filename.clone(),
            href: self.data_uri(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadLink {
    pub filename: String,
    pub href: String,
}
