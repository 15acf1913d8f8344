//! API endpoint implementations.

pub mod auth;
pub mod health;
pub mod messages;

pub use auth::AuthApi;
pub use health::HealthApi;
pub use messages::MessagesApi;
