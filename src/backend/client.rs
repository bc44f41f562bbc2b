//! HTTP client for the search backend.

use crate::error::BackendError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Health check against `/`.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
/// Index listing.
pub const LISTING_TIMEOUT: Duration = Duration::from_secs(15);
/// Mapping fetches and direct lookups.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);
/// Federated joins and multi-step task searches.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(60);

/// The operations every task needs from the backend.
///
/// Calls are single-attempt; retry policy belongs to the caller.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn get(&self, path: &str, timeout: Duration) -> Result<Value, BackendError>;

    async fn post(&self, path: &str, body: &Value, timeout: Duration)
        -> Result<Value, BackendError>;
}

/// Connection settings for [`SearchClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub verify_tls: bool,
}

/// reqwest-backed [`SearchBackend`].
pub struct SearchClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl SearchClient {
    pub fn new(config: ClientConfig) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| BackendError::Unavailable {
                path: config.base_url.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.username {
            Some(ref user) => request.basic_auth(user, self.config.password.as_ref()),
            None => request,
        }
    }

    async fn send(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, BackendError> {
        let response = self.authorize(request).send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("request timed out: {}", e)
            } else if e.is_connect() {
                format!("cannot connect to {}: {}", self.config.base_url, e)
            } else {
                e.to_string()
            };
            BackendError::Unavailable {
                path: path.to_string(),
                message,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::RequestFailed {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::InvalidResponse {
                path: path.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl SearchBackend for SearchClient {
    async fn get(&self, path: &str, timeout: Duration) -> Result<Value, BackendError> {
        debug!("GET {}", path);
        let request = self.http_client.get(self.url(path)).timeout(timeout);
        self.send(path, request).await
    }

    async fn post(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, BackendError> {
        debug!("POST {} {}", path, body);
        let request = self
            .http_client
            .post(self.url(path))
            .json(body)
            .timeout(timeout);
        self.send(path, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };
    use serde_json::json;

    fn client_for(server: &MockServer) -> SearchClient {
        SearchClient::new(ClientConfig {
            base_url: server.base_url(),
            username: Some("sirenadmin".to_string()),
            password: Some("password".to_string()),
            verify_tls: false,
        })
        .expect("client")
    }

    #[tokio::test]
    async fn test_post_sends_body_and_auth() {
        let server = MockServer::start_async().await;
        let mock = server.mock_async(|when, then| {
            when.method(POST)
                .path("/company/_search")
                .header_exists("authorization")
                .json_body(json!({ "size": 1, "query": { "match_all": {} } }));
            then.status(200)
                .json_body(json!({ "hits": { "total": { "value": 0 }, "hits": [] } }));
        })
        .await;

        let client = client_for(&server);
        let body = json!({ "size": 1, "query": { "match_all": {} } });
        let value = client
            .post("/company/_search", &body, LOOKUP_TIMEOUT)
            .await
            .expect("post");

        mock.assert_async().await;
        assert_eq!(value["hits"]["total"]["value"], 0);
    }

    #[tokio::test]
    async fn test_non_success_status_is_request_failed() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/missing/_mapping");
            then.status(404).body("index_not_found");
        })
        .await;

        let client = client_for(&server);
        let err = client
            .get("/missing/_mapping", LOOKUP_TIMEOUT)
            .await
            .unwrap_err();

        match err {
            BackendError::RequestFailed { path, status, body } => {
                assert_eq!(path, "/missing/_mapping");
                assert_eq!(status, 404);
                assert_eq!(body, "index_not_found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let client = SearchClient::new(ClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            username: None,
            password: None,
            verify_tls: true,
        })
        .expect("client");

        let err = client.get("/", HEALTH_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { .. }));
        assert_eq!(err.path(), "/");
    }

    #[tokio::test]
    async fn test_non_json_body_is_invalid_response() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).body("<html>");
        })
        .await;

        let err = client_for(&server)
            .get("/", HEALTH_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse { .. }));
    }
}
