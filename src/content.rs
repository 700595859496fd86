//! Where fill payloads come from: the content service over HTTP, or the
//! local SQLite store (see [`crate::database::LocalContentSource`]).

use crate::payload::FillPayload;
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content {0} not found")]
    NotFound(String),
    #[error("content service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("content service unreachable: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unreadable content payload: {0}")]
    Decode(String),
    #[error("local store: {0}")]
    Store(String),
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Payload of `content_id` prepared for `platform_id`.
    async fn fetch_payload(
        &self,
        content_id: &str,
        platform_id: &str,
    ) -> Result<FillPayload, ContentError>;
}

/// The service answers either with the payload itself or wrapped in
/// `{success, data, error}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ApiBody {
    Envelope {
        success: bool,
        data: Option<FillPayload>,
        error: Option<String>,
    },
    Bare(FillPayload),
}

pub struct ApiContentSource {
    client: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl ApiContentSource {
    pub fn new(api_base: &str, api_token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base: api_base.trim_end_matches('/').to_string(),
            token: api_token,
        })
    }

    fn article_url(&self, content_id: &str) -> String {
        format!("{}/api/articles/{}", self.base, content_id)
    }
}

#[async_trait]
impl ContentSource for ApiContentSource {
    async fn fetch_payload(
        &self,
        content_id: &str,
        platform_id: &str,
    ) -> Result<FillPayload, ContentError> {
        let url = self.article_url(content_id);
        debug!("[content] GET {} platform={}", url, platform_id);
        let mut request = self.client.get(&url).query(&[("platform", platform_id)]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ContentError::NotFound(content_id.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ContentError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: ApiBody = response
            .json()
            .await
            .map_err(|e| ContentError::Decode(e.to_string()))?;
        let payload = match body {
            ApiBody::Envelope {
                success: true,
                data: Some(data),
                ..
            } => data,
            ApiBody::Envelope { error, .. } => {
                return Err(ContentError::Status {
                    status: status.as_u16(),
                    message: error.unwrap_or_else(|| "request failed".into()),
                })
            }
            ApiBody::Bare(payload) => payload,
        };
        info!("[content] 已获取 {} ({})", content_id, platform_id);
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_enveloped_payload_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/articles/42"))
            .and(query_param("platform", "zhihu"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"title": "Hello", "content": "<p>Body</p>", "tags": ["a", "b"]}
            })))
            .mount(&server)
            .await;

        let source = ApiContentSource::new(&server.uri(), Some("secret".into())).unwrap();
        let payload = source.fetch_payload("42", "zhihu").await.unwrap();
        assert_eq!(payload.title.as_deref(), Some("Hello"));
        assert_eq!(payload.content.as_deref(), Some("<p>Body</p>"));
    }

    #[tokio::test]
    async fn accepts_a_bare_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/articles/7"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"videoTitle": "Clip"})),
            )
            .mount(&server)
            .await;

        let source = ApiContentSource::new(&format!("{}/", server.uri()), None).unwrap();
        let payload = source.fetch_payload("7", "douyin").await.unwrap();
        assert_eq!(payload.video_title.as_deref(), Some("Clip"));
    }

    #[tokio::test]
    async fn maps_missing_and_failed_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/articles/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/articles/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "quota exceeded"
            })))
            .mount(&server)
            .await;

        let source = ApiContentSource::new(&server.uri(), None).unwrap();
        assert!(matches!(
            source.fetch_payload("missing", "x").await,
            Err(ContentError::NotFound(id)) if id == "missing"
        ));
        match source.fetch_payload("broken", "x").await {
            Err(ContentError::Status { message, .. }) => assert_eq!(message, "quota exceeded"),
            other => panic!("unexpected {:?}", other.map(|p| p.title)),
        }
    }
}
