//! HTTP client SDK for the Parley REST collaborators.
//!
//! The chat socket's companion endpoints: login, registration, token
//! refresh, logout, current-user lookup, message history, and a health
//! probe. This crate consumes those contracts; it implements none of them.

mod client;
mod error;

pub mod api;

pub use api::auth::{AuthApi, RefreshedTokens, RegisterResponse, TokenPair};
pub use api::health::{HealthApi, HealthReport};
pub use api::messages::{MessagesApi, StoredMessage};
pub use client::{ClientBuilder, ParleyApi};
pub use error::{Error, Result};
