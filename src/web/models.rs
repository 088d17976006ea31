use serde::{Deserialize, Serialize};

use crate::relay::{self, Speaker, Turn};

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "isUser")]
    pub is_user: bool,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<HistoryEntry>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub mode: String,
}

impl From<HistoryEntry> for Turn {
    fn from(entry: HistoryEntry) -> Self {
        Turn {
            speaker: if entry.is_user {
                Speaker::User
            } else {
                Speaker::Assistant
            },
            text: entry.text,
        }
    }
}

impl From<ChatRequest> for relay::ChatRequest {
    fn from(req: ChatRequest) -> Self {
        relay::ChatRequest {
            message: req.message.unwrap_or_default(),
            history: req
                .history
                .unwrap_or_default()
                .into_iter()
                .map(Turn::from)
                .collect(),
        }
    }
}
