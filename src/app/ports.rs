use crate::error::Result;
use async_trait::async_trait;

/// Outbound HTTP used by every fetcher. Non-2xx responses come back as values;
/// only transport failures are errors.
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
    async fn post(&self, request: PostRequest) -> Result<HttpResponse>;
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Clone, Debug)]
pub struct PostRequest {
    pub url: String,
    pub bearer_token: Option<String>,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl PostRequest {
    pub fn json(url: &str, body: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            url: url.to_string(),
            bearer_token: None,
            content_type: "application/json".to_string(),
            body: serde_json::to_vec(body)?,
        })
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        self.bearer_token = Some(token.to_string());
        self
    }
}
