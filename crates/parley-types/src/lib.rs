//! Shared types for the Parley chat client.
//!
//! Everything the other crates exchange lives here: user identity, the
//! messages delivered to bus subscribers, and the JSON wire frames spoken
//! over the chat socket.

pub mod identity;
pub mod message;
pub mod wire;

pub use identity::{Identity, User};
pub use message::{ChatMessage, MessageKind};
pub use wire::{ClientFrame, LoadingStatus, ServerFrame};

use chrono::{DateTime, Utc};

/// Message identifier.
pub type Id = String;

/// Timestamp type used across crates.
pub type Timestamp = DateTime<Utc>;

/// Current time.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Generate a message id: millisecond timestamp plus a random suffix.
///
/// Used both for locally-authored messages (so the server echo can be
/// matched against the local copy) and for inbound frames the server sent
/// without an id.
pub fn new_id() -> Id {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::random();
    format!("{millis}-{suffix:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_unique() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert!(a.contains('-'));
    }
}
