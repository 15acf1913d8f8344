//! Message-history API.
//!
//! The live session holds no history; a UI that wants the backlog fetches
//! it here when it mounts.

use serde::Deserialize;

use parley_types::Timestamp;

use crate::client::ParleyApi;
use crate::error::Result;

/// A persisted message from the history endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub content: String,
    pub is_from_user: bool,
    pub created_at: Timestamp,
}

#[derive(serde::Serialize)]
struct HistoryQuery<'a> {
    session: &'a str,
}

/// Message-history API client.
pub struct MessagesApi {
    client: ParleyApi,
}

impl MessagesApi {
    pub(crate) fn new(client: ParleyApi) -> Self {
        Self { client }
    }

    /// Fetch the stored messages of a chat session, oldest first.
    pub async fn history(&self, access_token: &str, session_id: &str) -> Result<Vec<StoredMessage>> {
        self.client
            .get_with_query(
                "messages/",
                &HistoryQuery {
                    session: session_id,
                },
                Some(access_token),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::ParleyApi;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_history_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/messages/"))
            .and(query_param("session", "s-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": 1,
                    "content": "hello",
                    "is_from_user": true,
                    "created_at": "2024-01-01T00:00:00Z"
                },
                {
                    "id": 2,
                    "content": "hi there",
                    "is_from_user": false,
                    "created_at": "2024-01-01T00:00:01Z"
                }
            ])))
            .mount(&server)
            .await;

        let client = ParleyApi::builder().base_url(server.uri()).build().unwrap();
        let history = client.messages().history("acc-1", "s-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].is_from_user);
        assert_eq!(history[1].content, "hi there");
    }
}
