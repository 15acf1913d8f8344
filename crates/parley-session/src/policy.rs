//! Reconnect policy: a pure decision, separate from the machinery.

use std::time::Duration;

/// Why the socket went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The server closed the connection (or it ended cleanly).
    ClosedByServer,
    /// A transport or protocol-level error killed the connection.
    Error,
    /// The caller asked for a reconnect. Never consulted against the
    /// policy; the manager reconnects immediately with a reset counter.
    Manual,
}

/// What to do after a disconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Try again after the given delay.
    Retry { delay: Duration },
    /// Stop trying; the session enters the failed state.
    GiveUp,
}

/// Decides whether a dropped connection is worth another attempt.
///
/// `attempt` is the number of reconnect attempts already made since the
/// last successful connection.
pub trait ReconnectPolicy: Send + Sync {
    fn decide(&self, attempt: u32, cause: DisconnectCause) -> ReconnectDecision;
}

/// Constant-delay policy: the same wait between attempts, up to a cap.
///
/// Sufficient for a single interactive session; anything smarter (jittered
/// exponential backoff, cause-sensitive delays) plugs in through the trait.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(5000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy for FixedDelay {
    fn decide(&self, attempt: u32, _cause: DisconnectCause) -> ReconnectDecision {
        if attempt >= self.max_attempts {
            ReconnectDecision::GiveUp
        } else {
            ReconnectDecision::Retry { delay: self.delay }
        }
    }
}
