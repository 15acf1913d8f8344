//! The live chat session core.
//!
//! A [`ChatSession`] binds one WebSocket to the credential owned by a
//! [`parley_auth::SessionAuthority`]: it connects when the identity signal
//! says so, survives credential rotation and network drops, backs off
//! reconnect attempts through a pluggable [`ReconnectPolicy`], suppresses
//! re-delivered frames with a bounded [`DedupWindow`], and fans accepted
//! messages out to [`MessageBus`] subscribers exactly once, in order.

pub mod bus;
pub mod dedup;
pub mod error;
pub mod manager;
pub mod policy;

pub use bus::{MessageBus, Subscription};
pub use dedup::{DEFAULT_WINDOW, DedupWindow};
pub use error::{Result, SessionError};
pub use manager::{AuthScheme, ChatSession, ConnectionState, SessionConfig, chat_socket_url};
pub use policy::{DisconnectCause, FixedDelay, ReconnectDecision, ReconnectPolicy};
