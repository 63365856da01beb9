use crate::app::ports::{HttpClientPort, HttpResponse, PostRequest};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

/// reqwest-backed adapter. Owns the connection pool for the whole run.
pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn into_response(resp: reqwest::Response) -> Result<HttpResponse> {
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp.bytes().await?.to_vec();
        Ok(HttpResponse {
            status,
            bytes,
            content_type,
        })
    }
}

impl Default for ReqwestHttp {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let resp = self.client.get(url).send().await?;
        Self::into_response(resp).await
    }

    async fn post(&self, request: PostRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(CONTENT_TYPE, request.content_type)
            .body(request.body);
        if let Some(token) = &request.bearer_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let resp = builder.send().await?;
        Self::into_response(resp).await
    }
}
