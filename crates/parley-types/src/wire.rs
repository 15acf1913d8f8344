//! JSON wire frames exchanged over the chat socket.
//!
//! Frames are tagged on `type` and decoded exactly once, at the socket
//! boundary. Anything that fails to parse is dropped there and never
//! reaches subscribers.

use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, MessageKind};
use crate::{Timestamp, new_id, now};

/// Frames sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// A chat message authored by the user.
    Message {
        id: String,
        content: String,
        timestamp: Timestamp,
    },
}

impl ClientFrame {
    /// Build the wire frame for a locally-authored message.
    pub fn from_message(msg: &ChatMessage) -> Self {
        Self::Message {
            id: msg.id.clone(),
            content: msg.content.clone(),
            timestamp: msg.timestamp,
        }
    }
}

/// Loading status reported by the server while it produces a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingStatus {
    Started,
    Completed,
}

/// Frames received from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// A chat message. The server does not always assign an id or
    /// timestamp, and `isUser` marks relayed copies of our own messages.
    Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        content: String,
        #[serde(rename = "isUser", default, skip_serializing_if = "Option::is_none")]
        is_user: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Timestamp>,
    },
    /// Response-production status.
    Loading { status: LoadingStatus },
    /// In-band error report.
    Error { error: String },
}

impl ServerFrame {
    /// Decode a frame into the message delivered to subscribers.
    ///
    /// Returns `None` for chat frames with no visible content; the
    /// original UI showed nothing for those and we keep that behavior.
    /// Frames without an id get a synthesized one, which means the
    /// deduplicator can never match two id-less frames against each other.
    pub fn into_message(self) -> Option<ChatMessage> {
        match self {
            ServerFrame::Message {
                id,
                content,
                is_user,
                timestamp,
            } => {
                if content.trim().is_empty() {
                    return None;
                }
                Some(ChatMessage {
                    id: id.unwrap_or_else(new_id),
                    kind: MessageKind::Chat,
                    content,
                    timestamp: timestamp.unwrap_or_else(now),
                    from_user: is_user.unwrap_or(false),
                })
            }
            ServerFrame::Loading { status } => {
                let kind = match status {
                    LoadingStatus::Started => MessageKind::LoadingStarted,
                    LoadingStatus::Completed => MessageKind::LoadingDone,
                };
                Some(ChatMessage::status(kind, ""))
            }
            ServerFrame::Error { error } => Some(ChatMessage::status(MessageKind::Error, error)),
        }
    }
}
