use crate::adapters::http::ReqwestTransport;
use crate::core::client::ApiClient;
use crate::domain::model::{ListQuery, RequestOptions, Resource};
use crate::domain::ports::Transport;
use crate::utils::error::{ApiError, Result};
use reqwest::Method;
use url::form_urlencoded;

/// Pass-through calls for the dashboard collections. Payloads stay opaque.
pub struct ResourceClient<T: Transport = ReqwestTransport> {
    client: ApiClient<T>,
}

impl<T: Transport> ResourceClient<T> {
    pub fn new(client: ApiClient<T>) -> Self {
        Self { client }
    }

    pub async fn list(&self, resource: Resource, query: &ListQuery) -> Result<serde_json::Value> {
        let options = RequestOptions {
            query: query.to_pairs(),
            ..Default::default()
        };
        tracing::debug!(resource = resource.name(), query = ?options.query, "📋 Listing");
        self.client.get_with(&resource.path(), options).await
    }

    pub async fn get(&self, resource: Resource, id: &str) -> Result<serde_json::Value> {
        self.client.get(&item_path(resource, id)?).await
    }

    pub async fn create(
        &self,
        resource: Resource,
        body: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.client.post(&resource.path(), Some(body)).await
    }

    pub async fn update(
        &self,
        resource: Resource,
        id: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.client.put(&item_path(resource, id)?, body).await
    }

    pub async fn remove(&self, resource: Resource, id: &str) -> Result<serde_json::Value> {
        self.client.delete(&item_path(resource, id)?).await
    }

    /// 批次匯入已解析好的資料列
    pub async fn bulk_import(
        &self,
        resource: Resource,
        rows: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        if rows.is_empty() {
            return Err(ApiError::ValidationError {
                message: format!("No rows to import into {}", resource.name()),
            });
        }
        if let Some(index) = rows.iter().position(|row| !row.is_object()) {
            return Err(ApiError::ValidationError {
                message: format!("Row {} is not an object", index + 1),
            });
        }

        tracing::info!(resource = resource.name(), rows = rows.len(), "📥 Bulk import");
        let path = format!("{}/bulk", resource.path());
        self.client
            .request(
                Method::POST,
                &path,
                Some(serde_json::json!({ "rows": rows })),
                None,
            )
            .await
    }
}

fn item_path(resource: Resource, id: &str) -> Result<String> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::ValidationError {
            message: format!("Empty id for {}", resource.name()),
        });
    }

    // form 編碼把空白轉成 '+'，路徑中改用 %20
    let encoded: String = form_urlencoded::byte_serialize(id.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    Ok(format!("{}/{}", resource.path(), encoded))
}
