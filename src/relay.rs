//! Background relay.
//!
//! The privileged side of the engine: fetches arbitrary URLs without page
//! CORS restrictions and proxies authenticated calls to the content API. It
//! runs as a tokio task; plugins talk to it through [`RelayClient`] over an
//! mpsc channel with oneshot replies. A closed channel means the relay went
//! away mid-session and is reported as [`RelayError::ContextInvalidated`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info, warn};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const QUEUE_DEPTH: usize = 32;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Message accepted by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum RelayRequest {
    FetchBlob {
        url: String,
    },
    ApiRequest {
        endpoint: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
}

fn default_method() -> String {
    "GET".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    /// The relay task is gone; every later call in this session fails the same way.
    #[error("relay context invalidated")]
    ContextInvalidated,
    /// No relay is configured for this session.
    #[error("relay unavailable")]
    Unavailable,
    #[error("relay request failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Relay: Send + Sync {
    async fn request(&self, request: RelayRequest) -> Result<RelayResponse, RelayError>;

    /// Fetches `url` and returns it as a `data:` URL.
    async fn fetch_blob(&self, url: &str) -> Result<String, RelayError> {
        let response = self
            .request(RelayRequest::FetchBlob {
                url: url.to_string(),
            })
            .await?;
        match (response.success, response.data) {
            (true, Some(Value::String(data_url))) => Ok(data_url),
            (true, _) => Err(RelayError::Failed("relay returned no data".into())),
            (false, _) => Err(RelayError::Failed(
                response.error.unwrap_or_else(|| "unknown relay error".into()),
            )),
        }
    }

    async fn api_request(
        &self,
        endpoint: &str,
        method: &str,
        body: Option<Value>,
    ) -> Result<Value, RelayError> {
        let response = self
            .request(RelayRequest::ApiRequest {
                endpoint: endpoint.to_string(),
                method: method.to_string(),
                body,
            })
            .await?;
        if response.success {
            Ok(response.data.unwrap_or(Value::Null))
        } else {
            Err(RelayError::Failed(
                response.error.unwrap_or_else(|| "unknown relay error".into()),
            ))
        }
    }
}

/// Relay used when the session has none; image fetches go straight to the
/// page-context fallback.
pub struct NoRelay;

#[async_trait]
impl Relay for NoRelay {
    async fn request(&self, _request: RelayRequest) -> Result<RelayResponse, RelayError> {
        Err(RelayError::Unavailable)
    }
}

/// Performs relay requests with a `reqwest` client.
pub struct RelayWorker {
    http: reqwest::Client,
    api_base: String,
    api_token: Option<String>,
}

impl RelayWorker {
    pub fn new(api_base: &str, api_token: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    pub async fn handle(&self, request: RelayRequest) -> RelayResponse {
        match request {
            RelayRequest::FetchBlob { url } => match self.fetch_data_url(&url).await {
                Ok(data_url) => RelayResponse::ok(Value::String(data_url)),
                Err(e) => {
                    warn!("[relay] fetchBlob {} failed: {}", url, e);
                    RelayResponse::fail(e)
                }
            },
            RelayRequest::ApiRequest {
                endpoint,
                method,
                body,
            } => match self.api(&endpoint, &method, body).await {
                Ok(data) => RelayResponse::ok(data),
                Err(e) => {
                    warn!("[relay] apiRequest {} {} failed: {}", method, endpoint, e);
                    RelayResponse::fail(e)
                }
            },
        }
    }

    async fn fetch_data_url(&self, url: &str) -> Result<String, String> {
        let resp = self.http.get(url).send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "application/octet-stream".into());
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?;
        debug!("[relay] fetched {} ({} bytes, {})", url, bytes.len(), mime);
        Ok(format!("data:{};base64,{}", mime, STANDARD.encode(&bytes)))
    }

    async fn api(&self, endpoint: &str, method: &str, body: Option<Value>) -> Result<Value, String> {
        let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.api_base, endpoint.trim_start_matches('/'))
        };
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|e| format!("invalid method {}: {}", method, e))?;
        let mut req = self.http.request(method, &url);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("HTTP {}: {}", status, text.trim()));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| format!("invalid JSON from {}: {}", url, e))
    }
}

struct Envelope {
    request: RelayRequest,
    reply: oneshot::Sender<RelayResponse>,
}

/// Cheap, cloneable handle to a running relay.
#[derive(Clone)]
pub struct RelayClient {
    tx: mpsc::Sender<Envelope>,
}

#[async_trait]
impl Relay for RelayClient {
    async fn request(&self, request: RelayRequest) -> Result<RelayResponse, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| RelayError::ContextInvalidated)?;
        rx.await.map_err(|_| RelayError::ContextInvalidated)
    }
}

/// Owner side of a spawned relay. Dropping it stops the relay as well.
pub struct RelayHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Stops accepting requests; clients see `ContextInvalidated` afterwards.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

/// Starts the relay task. Requests are served concurrently.
pub fn spawn_relay(worker: RelayWorker) -> (RelayClient, RelayHandle) {
    let (tx, mut rx) = mpsc::channel::<Envelope>(QUEUE_DEPTH);
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let worker = Arc::new(worker);

    let task = tokio::spawn(async move {
        info!("[relay] started");
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                next = rx.recv() => {
                    let Some(Envelope { request, reply }) = next else { break };
                    let worker = worker.clone();
                    tokio::spawn(async move {
                        let response = worker.handle(request).await;
                        let _ = reply.send(response);
                    });
                }
            }
        }
        info!("[relay] stopped");
    });

    (
        RelayClient { tx },
        RelayHandle {
            shutdown: Some(shutdown_tx),
            task,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn request_wire_shape() {
        let req = RelayRequest::FetchBlob {
            url: "https://cdn.example.com/a.png".into(),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"action": "fetchBlob", "data": {"url": "https://cdn.example.com/a.png"}})
        );

        let parsed: RelayRequest =
            serde_json::from_value(json!({"action": "apiRequest", "data": {"endpoint": "/api/x"}}))
                .unwrap();
        assert_eq!(
            parsed,
            RelayRequest::ApiRequest {
                endpoint: "/api/x".into(),
                method: "GET".into(),
                body: None
            }
        );
    }

    #[tokio::test]
    async fn fetch_blob_returns_data_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .mount(&server)
            .await;

        let (client, handle) = spawn_relay(RelayWorker::new(&server.uri(), None).unwrap());
        let data_url = client
            .fetch_blob(&format!("{}/img.png", server.uri()))
            .await
            .unwrap();

        assert_eq!(data_url, format!("data:image/png;base64,{}", STANDARD.encode([1u8, 2, 3])));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn fetch_blob_reports_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (client, _handle) = spawn_relay(RelayWorker::new(&server.uri(), None).unwrap());
        let err = client
            .fetch_blob(&format!("{}/missing.png", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Failed(msg) if msg.contains("404")));
    }

    #[tokio::test]
    async fn api_request_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/articles/7/video-metadata"))
            .and(query_param("platform", "douyin"))
            .and(header("authorization", "Bearer t0k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"title": "clip"})))
            .mount(&server)
            .await;

        let (client, _handle) =
            spawn_relay(RelayWorker::new(&server.uri(), Some("t0k".into())).unwrap());
        let data = client
            .api_request("/api/articles/7/video-metadata?platform=douyin", "get", None)
            .await
            .unwrap();

        assert_eq!(data, json!({"title": "clip"}));
    }

    #[tokio::test]
    async fn shut_down_relay_invalidates_context() {
        let (client, handle) = spawn_relay(RelayWorker::new("http://127.0.0.1:9", None).unwrap());
        handle.shutdown().await;

        let err = client.fetch_blob("https://cdn.example.com/a.png").await.unwrap_err();
        assert!(matches!(err, RelayError::ContextInvalidated));
    }
}
