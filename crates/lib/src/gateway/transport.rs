//! HTTP transport seam under the gateway. The production implementation is `reqwest`;
//! tests script replies without a network.

use async_trait::async_trait;

/// What the gateway needs from one HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct HttpReply {
    pub status: u16,
    /// Raw `Date` header, if any.
    pub date: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

/// One POST with a JSON body. `Err` means the exchange did not complete (connect, TLS, reset, body read).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, String>;
}

/// `reqwest`-backed transport. No per-request timeout is set.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, String> {
        let res = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let header = |name: reqwest::header::HeaderName| {
            res.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        let date = header(reqwest::header::DATE);
        let content_type = header(reqwest::header::CONTENT_TYPE);
        let status = res.status().as_u16();
        let body = res.text().await.map_err(|e| e.to_string())?;
        Ok(HttpReply {
            status,
            date,
            content_type,
            body,
        })
    }
}
