//! Auth API: login, registration, refresh, logout, current user.

use serde::{Deserialize, Serialize};

use parley_types::User;

use crate::client::ParleyApi;
use crate::error::Result;

/// Access/refresh token pair returned by login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Response from the registration endpoint.
///
/// Registration issues the same token pair as login, plus the id of the
/// chat session created for the new account.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub access: String,
    pub refresh: String,
    #[serde(default)]
    pub chat_session_id: Option<String>,
}

/// Tokens returned by the refresh endpoint.
///
/// The server may omit the refresh token when it does not rotate it; the
/// caller keeps the old one in that case.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedTokens {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Auth API client.
pub struct AuthApi {
    client: ParleyApi,
}

impl AuthApi {
    pub(crate) fn new(client: ParleyApi) -> Self {
        Self { client }
    }

    /// Exchange username/password for a token pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        self.client
            .post("auth/login/", &LoginRequest { username, password }, None)
            .await
    }

    /// Register a new account. Issues tokens like a login.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterResponse> {
        self.client
            .post(
                "auth/register/",
                &RegisterRequest {
                    username,
                    email,
                    password,
                },
                None,
            )
            .await
    }

    /// Exchange a refresh token for fresh tokens.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens> {
        self.client
            .post(
                "auth/refresh/",
                &RefreshRequest {
                    refresh: refresh_token,
                },
                None,
            )
            .await
    }

    /// Invalidate a refresh token server-side.
    pub async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        self.client
            .post_no_content(
                "auth/logout/",
                &RefreshRequest {
                    refresh: refresh_token,
                },
                Some(access_token),
            )
            .await
    }

    /// Fetch the user behind an access token.
    pub async fn current_user(&self, access_token: &str) -> Result<User> {
        self.client.get("auth/user/", Some(access_token)).await
    }
}
