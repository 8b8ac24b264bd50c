use crate::domain::model::{ApiRequest, ApiResponse};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Sends a request to the backend and returns whatever status came back.
///
/// Only failures that produce no HTTP response at all (connect errors,
/// timeouts, unreadable bodies) are reported as `Err`; every status code,
/// including 401, comes back as an `ApiResponse` so the client can decide
/// what to do with it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// 刷新失敗時清除應用程式端的 session 狀態
pub type SessionInvalidator = Arc<dyn Fn() + Send + Sync>;
