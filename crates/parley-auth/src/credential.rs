//! The access/refresh credential pair and its expiry arithmetic.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use parley_types::Timestamp;

/// A renewable proof of identity: bearer access token, refresh token, and
/// the instant the access token stops working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Timestamp,
}

impl Credential {
    /// Create a credential with an explicit expiry.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: Timestamp,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Create a credential expiring `lifetime` from now.
    ///
    /// The login and refresh endpoints return bare token pairs; the expiry
    /// is a client-side assumption about the token lifetime.
    pub fn with_lifetime(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        lifetime: Duration,
    ) -> Self {
        let lifetime = chrono::Duration::from_std(lifetime).unwrap_or(chrono::Duration::zero());
        Self::new(access_token, refresh_token, Utc::now() + lifetime)
    }

    /// Whether the access token is already past its expiry.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// How long until the refresh timer should fire: `expires_at - margin`,
    /// saturating to zero when that instant has already passed.
    pub fn time_until_refresh(&self, margin: Duration) -> Duration {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero());
        let deadline = self.expires_at - margin;
        (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_lifetime_not_expired() {
        let cred = Credential::with_lifetime("a", "r", Duration::from_secs(3600));
        assert!(!cred.is_expired());
    }

    #[test]
    fn test_expired() {
        let cred = Credential::new("a", "r", Utc::now() - chrono::Duration::seconds(1));
        assert!(cred.is_expired());
    }

    #[test]
    fn test_refresh_fires_margin_before_expiry() {
        // Hour-long token with a five minute margin refreshes at ~55 min.
        let cred = Credential::with_lifetime("a", "r", Duration::from_secs(3600));
        let wait = cred.time_until_refresh(Duration::from_secs(300));
        assert!(wait > Duration::from_secs(3290));
        assert!(wait <= Duration::from_secs(3300));
    }

    #[test]
    fn test_refresh_wait_saturates() {
        let cred = Credential::with_lifetime("a", "r", Duration::from_secs(60));
        let wait = cred.time_until_refresh(Duration::from_secs(300));
        assert_eq!(wait, Duration::ZERO);
    }
}
