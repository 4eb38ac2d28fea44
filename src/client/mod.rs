//! HTTP client for the user backend API.

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse response: {source}")]
    Decode {
        source: serde_json::Error,
        body: String,
    },
}

/// Client for the fixed backend origin.
///
/// `fetch` and `create` build lazy futures: no I/O happens until the
/// returned future is polled. Every call is a fresh request with a
/// constant `Content-Type: application/json` header set — no retries,
/// no timeouts, no caching; failures surface as-is to the caller.
#[derive(Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    base_origin: String,
}

impl ApiClient {
    /// Create a client against a backend origin.
    pub fn new(base_origin: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_origin: base_origin.into(),
        }
    }

    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    /// GET `{base_origin}{path}` and decode the JSON body.
    pub async fn fetch<R: DeserializeOwned>(&self, path: &str) -> Result<R, TransportError> {
        let url = format!("{}{path}", self.base_origin);

        let response = self
            .client
            .get(&url)
            .headers(Self::build_headers())
            .send()
            .await?;

        Self::decode(response).await
    }

    /// POST `payload` as the JSON body to `{base_origin}{path}` and decode
    /// the response body.
    pub async fn create<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<R, TransportError> {
        let url = format!("{}{path}", self.base_origin);

        let response = self
            .client
            .post(&url)
            .headers(Self::build_headers())
            .json(payload)
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<R, TransportError> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|source| TransportError::Decode { source, body: text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::thread;

    struct Received {
        method: String,
        url: String,
        body: String,
        content_type: String,
    }

    /// Serve exactly one request on a loopback port.
    fn spawn_one_shot(
        status: u16,
        reply: &'static str,
    ) -> (String, thread::JoinHandle<Received>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let origin = format!("http://{}", server.server_addr().to_ip().unwrap());

        let handle = thread::spawn(move || {
            let mut request = server.recv().unwrap();

            let mut body = String::new();
            request.as_reader().read_to_string(&mut body).unwrap();
            let received = Received {
                method: request.method().to_string(),
                url: request.url().to_string(),
                body,
                content_type: request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Content-Type"))
                    .map(|h| h.value.to_string())
                    .unwrap_or_default(),
            };

            let response = tiny_http::Response::from_string(reply)
                .with_status_code(status)
                .with_header(
                    "Content-Type: application/json"
                        .parse::<tiny_http::Header>()
                        .unwrap(),
                );
            request.respond(response).unwrap();
            received
        });

        (origin, handle)
    }

    #[tokio::test]
    async fn test_fetch_decodes_body() {
        let (origin, server) = spawn_one_shot(200, r#"{"username":"alice","email":"a@x.io"}"#);
        let client = ApiClient::new(origin);

        let body: serde_json::Value = client.fetch("/api/users/1").await.unwrap();
        assert_eq!(body["username"], "alice");

        let received = server.join().unwrap();
        assert_eq!(received.method, "GET");
        assert_eq!(received.url, "/api/users/1");
        assert!(received.content_type.starts_with("application/json"));
    }

    #[tokio::test]
    async fn test_fetch_non_success_is_status_error() {
        let (origin, server) = spawn_one_shot(500, "boom");
        let client = ApiClient::new(origin);

        let result = client.fetch::<serde_json::Value>("/api/users/1").await;
        match result {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected status error, got {other:?}"),
        }
        server.join().unwrap();
    }

    #[tokio::test]
    async fn test_fetch_unparseable_body_is_decode_error() {
        let (origin, server) = spawn_one_shot(200, "not json");
        let client = ApiClient::new(origin);

        let result = client.fetch::<serde_json::Value>("/api/users/1").await;
        assert!(matches!(result, Err(TransportError::Decode { .. })));
        server.join().unwrap();
    }

    #[tokio::test]
    async fn test_create_posts_json_payload() {
        let (origin, server) = spawn_one_shot(201, "{}");
        let client = ApiClient::new(origin);

        let payload = serde_json::json!({"username": "henry", "email": "henry@example.com"});
        let body: serde_json::Value = client.create("/api/users", &payload).await.unwrap();
        assert!(body.as_object().unwrap().is_empty());

        let received = server.join().unwrap();
        assert_eq!(received.method, "POST");
        assert_eq!(received.url, "/api/users");
        assert!(received.content_type.starts_with("application/json"));
        let sent: serde_json::Value = serde_json::from_str(&received.body).unwrap();
        assert_eq!(sent, payload);
    }

    #[tokio::test]
    async fn test_connection_failure_is_http_error() {
        // Nothing listens on the discard port.
        let client = ApiClient::new("http://127.0.0.1:9");
        let result = client.fetch::<serde_json::Value>("/api/users/1").await;
        assert!(matches!(result, Err(TransportError::Http(_))));
    }
}
