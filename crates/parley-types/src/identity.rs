//! Authenticated identity, as resolved from a valid credential.

use serde::{Deserialize, Serialize};

/// A user account, as returned by the current-user endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// The resolved identity of the session.
///
/// `Anonymous` after logout or refresh failure; `Authenticated` once a
/// credential has been validated against the current-user endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Identity {
    #[default]
    Anonymous,
    Authenticated(User),
}

impl Identity {
    /// Whether this identity is authenticated.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated(_))
    }

    /// The user behind this identity, if authenticated.
    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Authenticated(user) => Some(user),
            Identity::Anonymous => None,
        }
    }

    /// Username for display, if authenticated.
    pub fn username(&self) -> Option<&str> {
        self.user().map(|u| u.username.as_str())
    }
}
