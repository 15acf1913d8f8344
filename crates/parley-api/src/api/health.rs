//! Health API.
//!
//! Health endpoints don't require authentication.

use serde::Deserialize;

use crate::client::ParleyApi;
use crate::error::Result;

/// Health report from the server.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub status: String,
}

/// Health API client.
pub struct HealthApi {
    client: ParleyApi,
}

impl HealthApi {
    pub(crate) fn new(client: ParleyApi) -> Self {
        Self { client }
    }

    /// Check basic health.
    pub async fn check(&self) -> Result<HealthReport> {
        self.client.get("health/", None).await
    }

    /// Simple connectivity check - returns true if server is reachable.
    pub async fn is_healthy(&self) -> bool {
        self.check().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use crate::ParleyApi;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})),
            )
            .mount(&server)
            .await;

        let client = ParleyApi::builder().base_url(server.uri()).build().unwrap();
        assert!(client.health().is_healthy().await);
        assert_eq!(client.health().check().await.unwrap().status, "ok");
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let client = ParleyApi::builder()
            .base_url("http://127.0.0.1:1")
            .build()
            .unwrap();
        assert!(!client.health().is_healthy().await);
    }
}
