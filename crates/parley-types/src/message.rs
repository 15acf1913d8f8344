//! Messages as delivered to bus subscribers.

use serde::{Deserialize, Serialize};

use crate::{Id, Timestamp, new_id, now};

/// What a delivered message represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A chat message (local echo or server-originated).
    Chat,
    /// The server started producing a response.
    LoadingStarted,
    /// The server finished producing a response.
    LoadingDone,
    /// An error reported in-band over the socket.
    Error,
}

/// A message accepted into the session, local or remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Id,
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: Timestamp,
    /// True for messages authored on this side of the socket.
    pub from_user: bool,
}

impl ChatMessage {
    /// Create a locally-authored chat message with a fresh id.
    pub fn outbound(content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            kind: MessageKind::Chat,
            content: content.into(),
            timestamp: now(),
            from_user: true,
        }
    }

    /// Create a server-originated chat message.
    pub fn inbound(id: Id, content: impl Into<String>, timestamp: Timestamp, from_user: bool) -> Self {
        Self {
            id,
            kind: MessageKind::Chat,
            content: content.into(),
            timestamp,
            from_user,
        }
    }

    /// Create a status message (loading/error) with a synthesized id.
    pub fn status(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            kind,
            content: content.into(),
            timestamp: now(),
            from_user: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_is_from_user() {
        let msg = ChatMessage::outbound("hello");
        assert!(msg.from_user);
        assert_eq!(msg.kind, MessageKind::Chat);
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn test_outbound_ids_distinct() {
        let a = ChatMessage::outbound("x");
        let b = ChatMessage::outbound("x");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_status_message() {
        let msg = ChatMessage::status(MessageKind::LoadingStarted, "");
        assert!(!msg.from_user);
        assert_eq!(msg.kind, MessageKind::LoadingStarted);
    }
}
