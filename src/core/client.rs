use crate::adapters::http::ReqwestTransport;
use crate::config::ClientConfig;
use crate::core::refresh::{RefreshCoordinator, RefreshState};
use crate::domain::model::{ApiRequest, ApiResponse, RequestOptions};
use crate::domain::ports::{SessionInvalidator, Transport};
use crate::utils::error::{ApiError, Result};
use crate::utils::validation::Validate;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Authenticated REST client.
///
/// Credentials travel in the transport's cookie store. A `401` on a fresh
/// request is recovered once through the shared [`RefreshCoordinator`];
/// everything else is returned to the caller as-is.
pub struct ApiClient<T: Transport = ReqwestTransport> {
    transport: Arc<T>,
    coordinator: Arc<RefreshCoordinator<T>>,
}

impl<T: Transport> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl ApiClient<ReqwestTransport> {
    /// 建立使用 reqwest 的 client，`invalidator` 會在 session 無法續期時呼叫
    pub fn new(config: ClientConfig, invalidator: Option<SessionInvalidator>) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(config.clone())?;
        Ok(Self::with_transport(transport, &config, invalidator))
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn with_transport(
        transport: T,
        config: &ClientConfig,
        invalidator: Option<SessionInvalidator>,
    ) -> Self {
        let transport = Arc::new(transport);
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&transport),
            config.refresh_path.clone(),
            config.refresh_timeout,
            invalidator,
        ));

        Self {
            transport,
            coordinator,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: Option<RequestOptions>,
    ) -> Result<serde_json::Value> {
        let request = ApiRequest::new(method, path, body).with_options(options.unwrap_or_default());
        let response = self.transport.send(&request).await?;

        if response.is_unauthorized() && self.coordinator.intercepts(&request) {
            let replayed = self.coordinator.recover(request).await?;
            return into_body(path, replayed);
        }

        into_body(path, response)
    }

    pub async fn get(&self, path: &str) -> Result<serde_json::Value> {
        self.request(Method::GET, path, None, None).await
    }

    pub async fn get_with(&self, path: &str, options: RequestOptions) -> Result<serde_json::Value> {
        self.request(Method::GET, path, None, Some(options)).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        self.request(Method::POST, path, body, None).await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        self.request(Method::PUT, path, Some(body), None).await
    }

    pub async fn patch(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        self.request(Method::PATCH, path, Some(body), None).await
    }

    pub async fn delete(&self, path: &str) -> Result<serde_json::Value> {
        self.request(Method::DELETE, path, None, None).await
    }

    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let body = self.get(path).await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn post_json<R: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<R> {
        let body = self.post(path, body).await?;
        Ok(serde_json::from_value(body)?)
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.coordinator.state()
    }

    pub fn parked_requests(&self) -> usize {
        self.coordinator.parked()
    }
}

/// 成功回傳 body，否則轉成對應的錯誤
fn into_body(path: &str, response: ApiResponse) -> Result<serde_json::Value> {
    if response.is_success() {
        return Ok(response.body);
    }

    if response.is_unauthorized() {
        return Err(ApiError::Unauthorized {
            path: path.to_string(),
        });
    }

    let body = match response.body {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    };
    Err(ApiError::Status {
        status: response.status,
        path: path.to_string(),
        body,
    })
}
