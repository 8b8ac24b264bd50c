use crate::config::ClientConfig;
use crate::domain::model::{ApiRequest, ApiResponse};
use crate::domain::ports::Transport;
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::Client;

/// reqwest 傳輸層，cookie 由內建的 cookie store 自動帶上
pub struct ReqwestTransport {
    client: Client,
    config: ClientConfig,
}

impl ReqwestTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .user_agent(config.user_agent.clone());

        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.config.endpoint(&request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header("Accept", "application/json");

        for (key, value) in &request.options.headers {
            builder = builder.header(key, value);
        }

        if !request.options.query.is_empty() {
            builder = builder.query(&request.options.query);
        }

        if let Some(timeout) = request.options.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            retried = request.is_retried(),
            "📡 Sending API request"
        );

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status,
            "📡 API response received"
        );

        Ok(ApiResponse::new(status, parse_body(&text)))
    }
}

/// 空內容視為 null，非 JSON 內容保留為字串
fn parse_body(text: &str) -> serde_json::Value {
    if text.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
}
